//! Sample assembly: label maps, sample tables and boundary handling.

mod assemble;
mod boundary;
mod labels;
mod table;

pub use assemble::{AssembleError, Assembly, assemble};
pub use boundary::{BandLabel, BoundaryStrategy};
pub use labels::LabelMap;
pub use table::SampleTable;
