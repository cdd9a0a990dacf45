use influxdb_line_protocol::ParsedLine;

/// A single field value of a [`Point`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    String(String),
    Boolean(bool),
}

impl FieldValue {
    /// The name of this value's type, as reported in type conflicts.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Integer(_) => "integer",
            Self::UInteger(_) => "unsigned",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
        }
    }
}

impl From<&influxdb_line_protocol::FieldValue<'_>> for FieldValue {
    fn from(value: &influxdb_line_protocol::FieldValue<'_>) -> Self {
        use influxdb_line_protocol::FieldValue as Lp;
        match value {
            Lp::I64(v) => Self::Integer(*v),
            Lp::U64(v) => Self::UInteger(*v),
            Lp::F64(v) => Self::Float(*v),
            Lp::String(v) => Self::String(v.to_string()),
            Lp::Boolean(v) => Self::Boolean(*v),
        }
    }
}

/// An owned, decoded line protocol point with its timestamp resolved to
/// nanoseconds since the epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    /// Tags in the order they appeared on the line.
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    pub timestamp: i64,
}

impl Point {
    pub(crate) fn from_parsed(line: &ParsedLine<'_>, timestamp: i64) -> Self {
        let tags = line
            .series
            .tag_set
            .as_ref()
            .map(|tags| {
                tags.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let fields = line
            .field_set
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::from(v)))
            .collect();

        Self {
            measurement: line.series.measurement.to_string(),
            tags,
            fields,
            timestamp,
        }
    }

    /// The canonical series key of this point: the escaped measurement
    /// followed by its tags sorted by key, e.g. `cpu,host=a,region=west`.
    pub fn series_key(&self) -> String {
        let mut tags: Vec<_> = self.tags.iter().collect();
        tags.sort();

        let mut key = String::with_capacity(self.measurement.len());
        escape_into(&mut key, &self.measurement, &[',', ' ']);
        for (k, v) in tags {
            key.push(',');
            escape_into(&mut key, k, &[',', '=', ' ']);
            key.push('=');
            escape_into(&mut key, v, &[',', '=', ' ']);
        }
        key
    }
}

fn escape_into(dst: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            dst.push('\\');
        }
        dst.push(c);
    }
}
