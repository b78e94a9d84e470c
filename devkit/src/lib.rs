/*!
# DAX DevKit - Stubs and utilities for reader development

Lets the run-control loop be exercised without boards or a database:
- Scripted hardware controller that records every call
- Coordination store wrapper with failure injection
- Builders for control documents
- A harness driving the loop one cycle at a time
*/

pub mod journal;
pub mod controller_stub;
pub mod store_stub;
pub mod command_builders;
pub mod test_utils;

pub use journal::Journal;
pub use controller_stub::{ControllerCall, MockController};
pub use store_stub::FlakyStore;
pub use command_builders::CommandBuilder;
pub use test_utils::TestHarness;
