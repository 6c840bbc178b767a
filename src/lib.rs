//! Error-driven isotropic target size fields and adaptation control for
//! h-adaptive remeshing of partitioned simplex meshes.
//!
//! Per-element error indicators are turned into a conforming per-vertex
//! target size field (scaled so the adapted mesh reaches a prescribed
//! element count), and the adaptation driver selects among the available
//! estimators before handing the mesh to the modification step.
use core::fmt;

pub mod adapt;
pub mod field;
pub mod mesh;
pub mod parallel;
pub mod size;

/// Result
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Error
#[derive(Debug)]
pub struct Error(String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Set the error message
    #[must_use]
    pub fn from(msg: &str) -> Box<Self> {
        Box::new(Self(msg.into()))
    }
}

/// Topological dimension
pub type Dim = u32;

/// Seed for minimum size reductions; also the size assigned to a vertex
/// with an empty element star
pub const H_MAX: f64 = 1e5;

/// Initialize the logger from the environment, defaulting to `level`
pub fn init_log(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Assert that two floating point values are closer than a tolerance
#[macro_export]
macro_rules! assert_delta {
    ($x:expr, $y:expr, $d:expr) => {
        assert!(
            ($x - $y).abs() < $d,
            "|{:.3e} - {:.3e}| = {:.3e} > {:.3e}",
            $x,
            $y,
            ($x - $y).abs(),
            $d
        )
    };
}
