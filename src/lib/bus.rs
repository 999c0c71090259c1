mod bus_interface;

pub use bus_interface::*;

// Mock implementation for testing.
#[cfg(test)]
mod bus_mock;
#[cfg(test)]
pub use bus_mock::MockDcpu;
