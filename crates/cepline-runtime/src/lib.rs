//! Cepline Runtime - windowing and pattern operators for complex event processing
//!
//! Events enter a pipeline through a [`factory`] source, are grouped into
//! finite batches by a [`window`] operator and evaluated by a [`pattern`]
//! operator, which derives one new event per satisfied matching set.
//!
//! ```rust
//! use cepline_runtime::{factory, pattern, window, Collector};
//!
//! let out = Collector::new();
//! factory::of([3, 9, 4, 12])
//!     .pipe(window::tumbling_count_window(2).unwrap())
//!     .pipe(pattern::value_max(["of"], "payload", |v| v > 10.0, "spike"))
//!     .subscribe(out.observer());
//!
//! let spikes = out.values();
//! assert_eq!(spikes.len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod factory;
pub mod location;
pub mod logging;
pub mod pattern;
pub mod predicate;
pub mod recurrence;
pub mod scheduler;
pub mod stream;
pub mod transform;
pub mod window;

pub use config::{Config, ConfigError, LoggingConfig, WindowConfig};
pub use error::{CepError, CepResult};
pub use event::{EventOccurrence, Item, PositionReading, SharedEvent, Window, PAYLOAD};
pub use factory::EventSource;
pub use location::{DistanceMetric, Haversine, Point};
pub use pattern::{PatternOperator, WindowPattern};
pub use predicate::{EventTypes, OrderPolicy};
pub use recurrence::Recurrence;
pub use scheduler::{
    Clock, Scheduler, SharedClock, SharedScheduler, SystemClock, TimerHandle, TokioScheduler,
    VirtualScheduler,
};
pub use stream::{
    observer_fn, Collector, Connectable, Observer, Operator, Stream, Subject, Subscriber,
    Subscription,
};
pub use transform::{project, Project};
pub use window::FlushPolicy;

pub use cepline_core::{Field, PathSegment, Value};
