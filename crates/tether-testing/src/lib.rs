//! Testing utilities and harness for Tether

pub mod clock;
pub mod doubles;
pub mod testing;

pub use clock::{ManualClock, StepDeadline};
pub use doubles::{GraphEvent, RecordingGraph, RecordingView, TestComponent, TestSubscriber};
pub use testing::*;

pub mod prelude {
    pub use crate::clock::*;
    pub use crate::doubles::*;
    pub use crate::testing::*;
}
