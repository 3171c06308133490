// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cooperative cancellation of a running evaluation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag checked by the driver between evaluation calls
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Guard that cancels on drop unless [`CancelOnDrop::disarm`] was called
    pub fn guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            cancellation: self.clone(),
            armed: true,
        }
    }
}

/// Cancels its [`Cancellation`] when dropped while still armed, e.g. when the
/// request future holding it is abandoned by the client disconnecting.
#[derive(Debug)]
pub struct CancelOnDrop {
    cancellation: Cancellation,
    armed: bool,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_an_armed_guard_cancels() {
        let cancellation = Cancellation::new();
        drop(cancellation.guard());
        assert!(cancellation.is_cancelled());
    }

    #[test]
    fn disarmed_guard_leaves_flag_alone() {
        let cancellation = Cancellation::new();
        cancellation.guard().disarm();
        assert!(!cancellation.is_cancelled());
    }
}
