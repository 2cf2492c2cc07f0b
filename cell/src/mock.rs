//! In-memory [`CellClient`] test double. Records every `Work` order it
//! receives and can be configured to refuse part of it or fail outright, so
//! scheduler-level tests can exercise the commit-phase failure paths (§4.3 /
//! §8 of the design notes) without a real transport.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RpcError;
use crate::work::{CellClient, FailedWork, Work};

#[derive(Default)]
pub struct MockCellClient {
    performed: Mutex<Vec<Work>>,
    refuse: Mutex<Option<FailedWork>>,
    fail_next: Mutex<bool>,
}

impl MockCellClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next call to `perform` will report `refused` as failed work instead
    /// of succeeding outright.
    pub fn refuse_next(&self, refused: FailedWork) {
        *self.refuse.lock().unwrap() = Some(refused);
    }

    /// Next call to `perform` will return a transport error.
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn perform_call_count(&self) -> usize {
        self.performed.lock().unwrap().len()
    }

    pub fn performed_args(&self, index: usize) -> Work {
        self.performed.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl CellClient for MockCellClient {
    async fn perform(&self, work: Work) -> Result<FailedWork, RpcError> {
        self.performed.lock().unwrap().push(work);

        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(RpcError::Transport("mock transport failure".into()));
        }

        if let Some(refused) = self.refuse.lock().unwrap().take() {
            return Ok(refused);
        }

        Ok(FailedWork::default())
    }
}
