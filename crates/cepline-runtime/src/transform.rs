//! Per-event attribute projection

use crate::error::CepError;
use crate::event::{EventOccurrence, FxIndexMap, Item};
use crate::scheduler::{Clock, SharedClock, SystemClock};
use crate::stream::{Observer, Operator, Stream, Subscriber};
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use tracing::warn;

const NAME: &str = "project";

/// Narrows each event to the named attributes under a new type.
///
/// The derived event keeps the source's occurrence time and is detected
/// now. Attributes absent from the source are left out.
#[derive(Clone)]
pub struct Project {
    attributes: Arc<[String]>,
    output: Arc<str>,
    clock: SharedClock,
}

pub fn project<I, S>(attributes: I, new_type: impl Into<Arc<str>>) -> Project
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Project {
        attributes: attributes.into_iter().map(Into::into).collect(),
        output: new_type.into(),
        clock: Arc::new(SystemClock),
    }
}

impl Project {
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn apply_to(&self, event: &EventOccurrence) -> EventOccurrence {
        let mut attributes = FxIndexMap::with_capacity_and_hasher(self.attributes.len(), FxBuildHasher);
        for name in self.attributes.iter() {
            if let Some(value) = event.get(name) {
                attributes.insert(name.clone(), value.clone());
            }
        }
        EventOccurrence::projected(
            Arc::clone(&self.output),
            event.occurrence_time(),
            self.clock.now(),
            attributes,
        )
    }
}

impl Operator<Item> for Project {
    type Output = Item;

    fn apply(self, source: Stream<Item>) -> Stream<Item> {
        Stream::new(move |downstream: Subscriber<Item>| {
            let parent = downstream.subscription().clone();
            source.subscribe_within(
                ProjectObserver {
                    project: self.clone(),
                    downstream,
                },
                &parent,
            );
        })
    }
}

struct ProjectObserver {
    project: Project,
    downstream: Subscriber<Item>,
}

impl Observer<Item> for ProjectObserver {
    fn next(&mut self, item: Item) {
        match item {
            Item::Event(event) => {
                let projected = self.project.apply_to(&event);
                self.downstream.next(Item::Event(Arc::new(projected)));
            }
            Item::Window(_) => {
                warn!(operator = NAME, "projection applied to a window");
                self.downstream
                    .error(CepError::UnexpectedWindow { operator: NAME });
            }
        }
    }

    fn error(&mut self, err: CepError) {
        self.downstream.error(err)
    }

    fn complete(&mut self) {
        self.downstream.complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::VirtualScheduler;
    use crate::stream::{Collector, Subject};
    use chrono::{TimeZone, Utc};

    fn reading() -> EventOccurrence {
        EventOccurrence::new("Reading", "sensor-7")
            .with_occurrence_time(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with_attribute("celsius", 21.5)
            .with_attribute("humidity", 40)
            .with_attribute("unit", "C")
    }

    #[test]
    fn test_project_keeps_named_attributes() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        let op = project(["celsius", "unit", "missing"], "Temperature")
            .with_clock(Arc::new(VirtualScheduler::new(now)));
        let source = reading();
        let out = op.apply_to(&source);
        assert_eq!(out.event_type_id(), "Temperature");
        assert_eq!(out.event_source(), "project");
        assert_eq!(out.occurrence_time(), source.occurrence_time());
        assert_eq!(out.detection_time(), Some(now));
        let keys: Vec<&str> = out.attributes().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["celsius", "unit"]);
        assert!(out.matching_set().is_none());
    }

    #[test]
    fn test_project_rejects_windows() {
        let subject = Subject::new();
        let out = Collector::new();
        let subscription = subject
            .stream()
            .pipe(project(["celsius"], "T"))
            .subscribe(out.observer());
        subject.next(Item::from(reading()));
        subject.next(Item::Window(vec![Arc::new(reading())]));
        subject.next(Item::from(reading()));
        assert_eq!(out.len(), 1);
        assert_eq!(out.errors(), vec![CepError::UnexpectedWindow { operator: "project" }]);
        assert!(subscription.is_closed());
    }
}
