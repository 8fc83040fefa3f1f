//! In-process event bus between mutations and subscriptions.
//!
//! Every successful post or comment mutation publishes an [`Event`]. Each
//! subscription holds its own receiver and evaluates its filter predicate
//! against every event in memory. Nothing is persisted: subscribers only see
//! events published while they are connected.

use futures::Stream;
use juniper::GraphQLEnum;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    api::model::{comment::Comment, post::Post},
    prelude::*,
    query::{Predicate, Record},
};


/// How many events may be buffered per subscriber before it starts lagging.
const CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, GraphQLEnum)]
pub(crate) enum MutationType {
    Created,
    Updated,
    Deleted,
}

/// A single change of a record. `node` is the record after the mutation
/// (unset for deletions), `previous` the one before (unset for creations).
#[derive(Debug, Clone)]
pub(crate) struct Change<T> {
    pub(crate) mutation: MutationType,
    pub(crate) node: Option<T>,
    pub(crate) previous: Option<T>,
}

impl<T: Record> Change<T> {
    pub(crate) fn created(node: T) -> Self {
        Self { mutation: MutationType::Created, node: Some(node), previous: None }
    }

    pub(crate) fn deleted(previous: T) -> Self {
        Self { mutation: MutationType::Deleted, node: None, previous: Some(previous) }
    }

    /// Deletions are matched against the deleted record, everything else
    /// against the new state.
    pub(crate) fn matches(&self, filter: &Predicate) -> bool {
        let record = match self.mutation {
            MutationType::Deleted => self.previous.as_ref(),
            MutationType::Created | MutationType::Updated => self.node.as_ref(),
        };

        record.is_some_and(|r| filter.matches(r))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Event {
    Post(Change<Post>),
    Comment(Change<Comment>),
}

impl Event {
    fn kind(&self) -> &'static str {
        match self {
            Event::Post(_) => "post",
            Event::Comment(_) => "comment",
        }
    }
}

/// Records that subscriptions can be opened for.
pub(crate) trait Subject: Record + Clone + Send + Sync + 'static {
    fn from_event(event: Event) -> Option<Change<Self>>;
}

impl Subject for Post {
    fn from_event(event: Event) -> Option<Change<Self>> {
        match event {
            Event::Post(change) => Some(change),
            _ => None,
        }
    }
}

impl Subject for Comment {
    fn from_event(event: Event) -> Option<Change<Self>> {
        match event {
            Event::Comment(change) => Some(change),
            _ => None,
        }
    }
}


#[derive(Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    /// Sends the event to all current subscribers. Having no subscribers is
    /// not an error.
    pub(crate) fn publish(&self, event: Event) {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(n) => trace!("Published {kind} event to {n} subscribers"),
            Err(_) => trace!("Dropped {kind} event: no subscribers"),
        }
    }

    /// A stream of all changes of `T` that match `filter`, starting now. The
    /// stream only ends when the bus is dropped.
    pub(crate) fn changes<T: Subject>(
        &self,
        filter: Predicate,
    ) -> impl Stream<Item = Change<T>> + Send + 'static {
        let rx = self.sender.subscribe();
        futures::stream::unfold((rx, filter), |(mut rx, filter)| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(change) = T::from_event(event) else {
                            continue;
                        };
                        if change.matches(&filter) {
                            return Some((change, (rx, filter)));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Subscriber lagged behind, skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::{FutureExt, StreamExt};

    use crate::{
        db::types::Key,
        query::{shape, Field, Predicate},
    };
    use super::*;


    fn post(key: i64, author: i64, published: bool) -> Post {
        Post::for_test(Key(key), Key(author), published)
    }

    fn comment(key: i64, post: i64) -> Comment {
        Comment::for_test(Key(key), Key(1), Key(post))
    }

    #[tokio::test]
    async fn delivers_matching_events() {
        let bus = EventBus::new();
        let stream = bus.changes::<Post>(shape::post_events());
        futures::pin_mut!(stream);

        bus.publish(Event::Post(Change::created(post(1, 1, false))));
        bus.publish(Event::Post(Change::created(post(2, 1, true))));

        let change = stream.next().await.unwrap();
        assert_eq!(change.mutation, MutationType::Created);
        assert_eq!(change.node.unwrap().key, Key(2));
        assert!(stream.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn ignores_other_kinds() {
        let bus = EventBus::new();
        let stream = bus.changes::<Comment>(Predicate::And(vec![]));
        futures::pin_mut!(stream);

        bus.publish(Event::Post(Change::created(post(1, 1, true))));
        bus.publish(Event::Comment(Change::created(comment(7, 1))));

        let change = stream.next().await.unwrap();
        assert_eq!(change.node.unwrap().key, Key(7));
    }

    #[tokio::test]
    async fn deletions_match_previous_values() {
        let bus = EventBus::new();
        let stream = bus.changes::<Comment>(shape::comment_events(Key(3)));
        futures::pin_mut!(stream);

        bus.publish(Event::Comment(Change::deleted(comment(5, 4))));
        bus.publish(Event::Comment(Change::deleted(comment(6, 3))));

        let change = stream.next().await.unwrap();
        assert_eq!(change.mutation, MutationType::Deleted);
        assert!(change.node.is_none());
        assert_eq!(change.previous.unwrap().key, Key(6));
    }

    #[tokio::test]
    async fn updates_match_new_state() {
        let bus = EventBus::new();
        let stream = bus.changes::<Post>(shape::post_events());
        futures::pin_mut!(stream);

        // Unpublishing a post is not seen by the public subscription.
        bus.publish(Event::Post(Change {
            mutation: MutationType::Updated,
            node: Some(post(1, 1, false)),
            previous: Some(post(1, 1, true)),
        }));
        bus.publish(Event::Post(Change {
            mutation: MutationType::Updated,
            node: Some(post(2, 1, true)),
            previous: Some(post(2, 1, false)),
        }));

        let change = stream.next().await.unwrap();
        assert_eq!(change.node.unwrap().key, Key(2));
    }

    #[tokio::test]
    async fn owner_filter() {
        let bus = EventBus::new();
        let stream = bus.changes::<Post>(Predicate::eq(Field::Author, Key(9)));
        futures::pin_mut!(stream);

        bus.publish(Event::Post(Change::created(post(1, 8, true))));
        bus.publish(Event::Post(Change::created(post(2, 9, false))));

        let change = stream.next().await.unwrap();
        assert_eq!(change.node.unwrap().key, Key(2));
    }

    #[tokio::test]
    async fn events_before_subscribing_are_not_delivered() {
        let bus = EventBus::new();
        bus.publish(Event::Post(Change::created(post(1, 1, true))));

        let stream = bus.changes::<Post>(Predicate::And(vec![]));
        futures::pin_mut!(stream);
        assert!(stream.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn lagging_subscriber_skips() {
        let bus = EventBus::new();
        let stream = bus.changes::<Post>(Predicate::And(vec![]));
        futures::pin_mut!(stream);

        for i in 0..(CAPACITY as i64 + 10) {
            bus.publish(Event::Post(Change::created(post(i, 1, true))));
        }

        // The oldest events were overwritten, the stream continues with what
        // is still buffered.
        let change = stream.next().await.unwrap();
        assert_eq!(change.node.unwrap().key, Key(10));
    }
}
