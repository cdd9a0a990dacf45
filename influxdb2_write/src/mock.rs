//! A recording [`PointsWriter`] for tests.

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use influxdb2_lp::Point;
use influxdb2_types::Id;
use parking_lot::Mutex;

use crate::{PointsWriter, PointsWriterError};

#[derive(Debug, Clone, PartialEq)]
pub struct MockPointsWriterCall {
    pub org_id: Id,
    pub bucket_id: Id,
    pub points: Vec<Point>,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<MockPointsWriterCall>,
    write_return: VecDeque<Result<(), PointsWriterError>>,
    latency: Option<Duration>,
}

/// Records every call and replies with the queued results, in order. Once
/// the queue is drained every write succeeds.
#[derive(Debug, Default)]
pub struct MockPointsWriter(Mutex<Inner>);

impl MockPointsWriter {
    pub fn with_write_return(
        self,
        ret: impl Into<VecDeque<Result<(), PointsWriterError>>>,
    ) -> Self {
        self.0.lock().write_return = ret.into();
        self
    }

    /// Stall every write for `latency` after recording the call.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.0.lock().latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<MockPointsWriterCall> {
        self.0.lock().calls.clone()
    }
}

#[async_trait]
impl PointsWriter for MockPointsWriter {
    async fn write_points(
        &self,
        org_id: Id,
        bucket_id: Id,
        points: Vec<Point>,
    ) -> Result<(), PointsWriterError> {
        let (ret, latency) = {
            let mut guard = self.0.lock();
            guard.calls.push(MockPointsWriterCall {
                org_id,
                bucket_id,
                points,
            });
            (guard.write_return.pop_front().unwrap_or(Ok(())), guard.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        ret
    }
}
