mod bus;
mod clock;
mod drive;
mod medium;
mod monitor;

pub use crate::bus::{Dcpu, Device, Register, MEMORY_WORDS};
pub use crate::clock::{Periodic, WallClock};
pub use crate::drive::{DriveError, DriveState, M35fd};
pub use crate::medium::{
    Medium, MediumError, MediumResult, Sector, SECTORS_PER_DISK, SECTORS_PER_TRACK,
    TRACKS_PER_DISK, WORDS_PER_DISK, WORDS_PER_SECTOR,
};
pub use crate::monitor::{Frame, Lem1802, Rgb, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Initialise logging for tests.
#[cfg(test)]
pub fn init_test_logging() {
    // The logger can only be initialised once, but we don't know the order of
    // tests. Therefore we ignore the result.
    let _ = simplelog::TestLogger::init(
        log::LevelFilter::Trace,
        simplelog::Config::default(),
    );
}
