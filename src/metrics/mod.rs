pub mod results_csv;
pub mod roc;
pub mod sigmoid_search;
pub mod subject;

pub use roc::{RocAccumulator, RocCurves};
pub use sigmoid_search::{SearchSubject, SigmoidSearchResult};
pub use subject::{SubjectStats, subject_stats};
