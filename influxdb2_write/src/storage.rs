//! An in-memory, block-backed [`PointsWriter`].
//!
//! Every write groups its points by `(series key, field)`, builds one typed
//! column per group and encodes it as a block appended to that field's block
//! list. Fields keep the type of their first write.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use influxdb2_lp::{FieldValue, Point};
use influxdb2_tsm::{BlockType, BlockValue, TypedArray};
use influxdb2_types::Id;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{PointsWriter, PointsWriterError};

/// Identifies the blocks of a single field of a single series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    pub org_id: Id,
    pub bucket_id: Id,
    pub series: String,
    pub field: String,
}

#[derive(Debug)]
struct Blocks {
    block_type: BlockType,
    blocks: Vec<Bytes>,
}

/// Errors returned when opening a [`BlockCursor`].
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("no blocks stored for field {field:?} of series {series:?}")]
    NotFound { series: String, field: String },

    #[error("field holds {stored} values, cannot read as {requested}")]
    TypeMismatch {
        stored: BlockType,
        requested: BlockType,
    },
}

/// Stores encoded blocks in memory.
#[derive(Debug, Default)]
pub struct BlockStore {
    fields: RwLock<BTreeMap<BlockKey, Blocks>>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The keys and value types of every stored field in `bucket_id`.
    pub fn fields(&self, org_id: Id, bucket_id: Id) -> Vec<(BlockKey, BlockType)> {
        self.fields
            .read()
            .iter()
            .filter(|(k, _)| k.org_id == org_id && k.bucket_id == bucket_id)
            .map(|(k, v)| (k.clone(), v.block_type))
            .collect()
    }

    /// Open a cursor over the blocks of `key`, decoding them as `T`.
    ///
    /// The cursor reads a snapshot of the blocks stored when it is opened.
    pub fn cursor<T: BlockValue>(&self, key: &BlockKey) -> Result<BlockCursor<T>, CursorError> {
        let fields = self.fields.read();
        let stored = fields.get(key).ok_or_else(|| CursorError::NotFound {
            series: key.series.clone(),
            field: key.field.clone(),
        })?;

        if stored.block_type != T::BLOCK_TYPE {
            return Err(CursorError::TypeMismatch {
                stored: stored.block_type,
                requested: T::BLOCK_TYPE,
            });
        }

        Ok(BlockCursor {
            blocks: stored.blocks.clone(),
            next: 0,
            current: TypedArray::new(),
        })
    }
}

#[async_trait]
impl PointsWriter for BlockStore {
    async fn write_points(
        &self,
        org_id: Id,
        bucket_id: Id,
        points: Vec<Point>,
    ) -> Result<(), PointsWriterError> {
        let n_points = points.len();
        let columns = build_columns(points)?;

        let mut encoded = Vec::with_capacity(columns.len());
        for ((series, field), column) in columns {
            let block_type = column.block_type();
            let block = column.encode()?;
            let key = BlockKey {
                org_id,
                bucket_id,
                series,
                field,
            };
            encoded.push((key, block_type, block));
        }

        let mut fields = self.fields.write();

        // Reject the whole write if any field changes type.
        for (key, block_type, _) in &encoded {
            if let Some(existing) = fields.get(key) {
                if existing.block_type != *block_type {
                    return Err(PointsWriterError::FieldTypeConflict {
                        series: key.series.clone(),
                        field: key.field.clone(),
                        existing: existing.block_type,
                        attempted: *block_type,
                    });
                }
            }
        }

        let n_blocks = encoded.len();
        for (key, block_type, block) in encoded {
            trace!(
                series = %key.series,
                field = %key.field,
                bytes = block.len(),
                "appending block"
            );
            fields
                .entry(key)
                .or_insert_with(|| Blocks {
                    block_type,
                    blocks: Vec::new(),
                })
                .blocks
                .push(block);
        }

        debug!(%org_id, %bucket_id, n_points, n_blocks, "stored points");
        Ok(())
    }
}

/// Samples of one field within a single write, before encoding.
#[derive(Debug)]
enum Column {
    Float(Vec<(i64, f64)>),
    Integer(Vec<(i64, i64)>),
    Unsigned(Vec<(i64, u64)>),
    Bool(Vec<(i64, bool)>),
    Str(Vec<(i64, String)>),
}

impl Column {
    fn new(value: &FieldValue) -> Self {
        match value {
            FieldValue::Float(_) => Self::Float(vec![]),
            FieldValue::Integer(_) => Self::Integer(vec![]),
            FieldValue::UInteger(_) => Self::Unsigned(vec![]),
            FieldValue::Boolean(_) => Self::Bool(vec![]),
            FieldValue::String(_) => Self::Str(vec![]),
        }
    }

    fn block_type(&self) -> BlockType {
        match self {
            Self::Float(_) => BlockType::Float,
            Self::Integer(_) => BlockType::Integer,
            Self::Unsigned(_) => BlockType::Unsigned,
            Self::Bool(_) => BlockType::Bool,
            Self::Str(_) => BlockType::Str,
        }
    }

    /// Append a sample, handing the value back if its type does not match.
    fn push(&mut self, timestamp: i64, value: FieldValue) -> Result<(), FieldValue> {
        match (self, value) {
            (Self::Float(s), FieldValue::Float(v)) => s.push((timestamp, v)),
            (Self::Integer(s), FieldValue::Integer(v)) => s.push((timestamp, v)),
            (Self::Unsigned(s), FieldValue::UInteger(v)) => s.push((timestamp, v)),
            (Self::Bool(s), FieldValue::Boolean(v)) => s.push((timestamp, v)),
            (Self::Str(s), FieldValue::String(v)) => s.push((timestamp, v)),
            (_, value) => return Err(value),
        }
        Ok(())
    }

    fn encode(self) -> Result<Bytes, influxdb2_tsm::Error> {
        match self {
            Self::Float(s) => encode_samples(s),
            Self::Integer(s) => encode_samples(s),
            Self::Unsigned(s) => encode_samples(s),
            Self::Bool(s) => encode_samples(s),
            Self::Str(s) => encode_samples(s),
        }
    }
}

fn block_type_of(value: &FieldValue) -> BlockType {
    Column::new(value).block_type()
}

fn build_columns(
    points: Vec<Point>,
) -> Result<BTreeMap<(String, String), Column>, PointsWriterError> {
    let mut columns: BTreeMap<(String, String), Column> = BTreeMap::new();

    for point in points {
        let series = point.series_key();
        for (field, value) in point.fields {
            let column = columns
                .entry((series.clone(), field.clone()))
                .or_insert_with(|| Column::new(&value));
            let existing = column.block_type();
            if let Err(value) = column.push(point.timestamp, value) {
                return Err(PointsWriterError::FieldTypeConflict {
                    series,
                    field,
                    existing,
                    attempted: block_type_of(&value),
                });
            }
        }
    }

    Ok(columns)
}

/// Sort the samples by time and encode them as a single block.
fn encode_samples<T: BlockValue>(
    mut samples: Vec<(i64, T)>,
) -> Result<Bytes, influxdb2_tsm::Error> {
    samples.sort_by_key(|(ts, _)| *ts);

    let mut array = TypedArray::with_size(samples.len())?;
    for (ts, v) in samples {
        array.push(ts, v);
    }

    let mut block = Vec::new();
    array.encode(&mut block)?;
    Ok(block.into())
}

/// Reads the blocks of one field in write order, decoding each into a single
/// reused array.
#[derive(Debug)]
pub struct BlockCursor<T> {
    blocks: Vec<Bytes>,
    next: usize,
    current: TypedArray<T>,
}

impl<T: BlockValue> BlockCursor<T> {
    /// Decode the next block, returning [`None`] once all blocks are read.
    pub fn next_block(&mut self) -> Option<Result<&TypedArray<T>, influxdb2_tsm::Error>> {
        let block = self.blocks.get(self.next)?;
        self.next += 1;
        Some(self.current.decode(block).map(|()| &self.current))
    }

    /// Decode the next block and copy its samples into `dst`, replacing its
    /// contents. Returns `false` once all blocks are read.
    pub fn next_into(&mut self, dst: &mut TypedArray<T>) -> Result<bool, influxdb2_tsm::Error> {
        match self.next_block() {
            Some(array) => {
                array?.copy_to(dst)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The number of blocks not yet read.
    pub fn remaining(&self) -> usize {
        self.blocks.len() - self.next
    }
}
