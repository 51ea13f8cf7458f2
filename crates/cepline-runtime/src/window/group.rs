//! Attribute-based regrouping of windows

use crate::error::CepError;
use crate::event::{Item, SharedEvent, Window};
use crate::stream::{Observer, Operator, Stream, Subscriber};
use cepline_core::Field;

const NAME: &str = "group_by";

/// Splits each window into runs of adjacent events sharing the value of
/// `field`. Events where the field is missing form runs of their own kind.
#[derive(Debug, Clone)]
pub struct GroupBy {
    field: Field,
}

pub fn group_by(field: impl Into<Field>) -> GroupBy {
    GroupBy {
        field: field.into(),
    }
}

impl GroupBy {
    pub fn split(&self, window: &[SharedEvent]) -> Vec<Window> {
        let mut runs: Vec<Window> = Vec::new();
        for event in window {
            let key = event.get_field(&self.field);
            match runs.last_mut() {
                Some(run) if run[0].get_field(&self.field) == key => run.push(SharedEvent::clone(event)),
                _ => runs.push(vec![SharedEvent::clone(event)]),
            }
        }
        runs
    }
}

impl Operator<Item> for GroupBy {
    type Output = Item;

    fn apply(self, source: Stream<Item>) -> Stream<Item> {
        Stream::new(move |downstream: Subscriber<Item>| {
            let parent = downstream.subscription().clone();
            source.subscribe_within(
                GroupObserver {
                    group: self.clone(),
                    downstream,
                },
                &parent,
            );
        })
    }
}

struct GroupObserver {
    group: GroupBy,
    downstream: Subscriber<Item>,
}

impl Observer<Item> for GroupObserver {
    fn next(&mut self, item: Item) {
        match item {
            Item::Window(window) => {
                for run in self.group.split(&window) {
                    self.downstream.next(Item::Window(run));
                }
            }
            Item::Event(_) => self
                .downstream
                .error(CepError::WindowRequired { operator: NAME }),
        }
    }

    fn error(&mut self, err: CepError) {
        self.downstream.error(err)
    }

    fn complete(&mut self) {
        self.downstream.complete()
    }
}
