//! Key providers: boundary adjustment, shifting, and extraction.

pub mod adjust;
pub mod extract;
pub mod shift;

pub use adjust::{
    AdjustKeyProvider, BoundarySource, FnBoundary, NonRecursiveAdjustKeyProvider,
    RecursiveAdjustKeyProvider,
};
pub use extract::{ExtractKeyProvider, ExtractKeyProviderCache};
pub use shift::{KeyNavigator, ShiftDelegate, ShiftKeyProvider, ShiftedNavigator};
