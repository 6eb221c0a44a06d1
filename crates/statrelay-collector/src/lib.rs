//! statrelay-collector — turns decoded metric messages into live metrics.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `dispatch` | [`Collector`]: routes messages to type collectors or the ad-hoc registry, renders |
//! | `container` | [`MetricsContainer`]: TTL-bounded snapshot storage with supersede filter |
//! | `collectors` | Built-in `process` and `web` type collectors |
//! | `clock` | Injectable monotonic clock |
//! | `error` | [`CollectorError`] |

pub mod clock;
pub mod collectors;
pub mod container;
pub mod dispatch;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collectors::{ProcessCollector, WebCollector};
pub use container::{MetricsContainer, SupersedeFilter};
pub use dispatch::{Collector, TypeCollector};
pub use error::{CollectorError, CollectorResult};
