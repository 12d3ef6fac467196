//! Public surface re-exported from the crate root.

pub use crate::agents::{Employed, EmployedState, Onlooker};
pub use crate::driver::{CommModel, Driver, DriverConfig, QueuePaths};
pub use crate::objective::Objective;
pub use crate::prob_matrix::ProbabilityMatrix;
pub use crate::problem::{Fusion, NonSeparable, Problem, Solver};
pub use crate::queue::{QueueError, QueueMode, SolutionQueue};
pub use crate::transport::{build_in_process, DriverTransport, TransportError, WorkerTransport};
pub use crate::worker::run_worker;
