// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2018-2026 Meridian Systems Pty Ltd. All rights reserved.
//  https://meridian.systems
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

use std::{
    any::Any,
    fmt::{self, Debug, Display},
    hash::{Hash, Hasher},
    ops::Deref,
};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use meridian_core::{
    UUID4,
    correctness::{FAILED, check_predicate_true, check_valid_string},
    identifiers::TraderId,
};
use ustr::Ustr;

use super::{
    database::{MessageBusConfig, MessageBusDatabase},
    handler::ShareableMessageHandler,
    matching::{is_matching, is_matching_bytes},
    serializer::{EXTERNAL_PUBLISHING_TYPES, MessageSerializer},
};

#[inline(always)]
fn check_fully_qualified_string(value: &Ustr, key: &str) -> anyhow::Result<()> {
    check_predicate_true(
        !value.chars().any(|c| c == '*' || c == '?'),
        &format!("{key} `value` contained invalid characters, was {value}"),
    )
}

/// Pattern is a string for a subscription with special characters for wildcard matching.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pattern;

/// Topic is a fully qualified string for publishing data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Topic;

/// Endpoint is a fully qualified string for sending data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint;

/// A message bus string type. It can be a pattern, a topic, or an endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MStr<T> {
    value: Ustr,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Display for MStr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Deref for MStr<T> {
    type Target = Ustr;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: Eq> PartialOrd for MStr<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Eq> Ord for MStr<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl MStr<Pattern> {
    /// Creates a new pattern from a string, which may contain the wildcard
    /// characters `*` and `?`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is empty, all whitespace, or contains
    /// non-ASCII characters.
    pub fn pattern<T: AsRef<str>>(value: T) -> anyhow::Result<Self> {
        check_valid_string(&value, stringify!(value))?;

        Ok(Self {
            value: Ustr::from(value.as_ref()),
            _marker: std::marker::PhantomData,
        })
    }
}

impl<T: AsRef<str>> From<T> for MStr<Pattern> {
    /// Creates a pattern from a string-like value.
    ///
    /// # Panics
    ///
    /// Panics if the value is not a valid pattern string.
    fn from(value: T) -> Self {
        Self::pattern(value).expect(FAILED)
    }
}

impl From<MStr<Topic>> for MStr<Pattern> {
    fn from(value: MStr<Topic>) -> Self {
        Self {
            value: value.value,
            _marker: std::marker::PhantomData,
        }
    }
}

impl MStr<Topic> {
    /// Creates a new topic from a fully qualified string.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is empty, all whitespace, contains
    /// non-ASCII characters, or contains the wildcard characters `*` or `?`.
    pub fn topic<T: AsRef<str>>(value: T) -> anyhow::Result<Self> {
        check_valid_string(&value, stringify!(value))?;
        let topic = Ustr::from(value.as_ref());
        check_fully_qualified_string(&topic, stringify!(Topic))?;

        Ok(Self {
            value: topic,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<T: AsRef<str>> From<T> for MStr<Topic> {
    /// Creates a topic from a string-like value.
    ///
    /// # Panics
    ///
    /// Panics if the value is not a valid topic string.
    fn from(value: T) -> Self {
        Self::topic(value).expect(FAILED)
    }
}

impl MStr<Endpoint> {
    /// Creates a new endpoint from a fully qualified string.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is empty, all whitespace, contains
    /// non-ASCII characters, or contains the wildcard characters `*` or `?`.
    pub fn endpoint<T: AsRef<str>>(value: T) -> anyhow::Result<Self> {
        check_valid_string(&value, stringify!(value))?;
        let endpoint = Ustr::from(value.as_ref());
        check_fully_qualified_string(&endpoint, stringify!(Endpoint))?;

        Ok(Self {
            value: endpoint,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<T: AsRef<str>> From<T> for MStr<Endpoint> {
    /// Creates an endpoint from a string-like value.
    ///
    /// # Panics
    ///
    /// Panics if the value is not a valid endpoint string.
    fn from(value: T) -> Self {
        Self::endpoint(value).expect(FAILED)
    }
}

/// Represents a subscription to a particular topic pattern.
///
/// This is an internal type used by the message bus to organize patterns and
/// their subscribers. Identity is `(pattern, handler_id)` only: priority is
/// deliberately excluded so that re-subscribing the same handler with a new
/// priority is detected as a duplicate. Subscriptions are immutable once
/// created; changing a priority requires unsubscribe then subscribe.
#[derive(Clone)]
pub struct Subscription {
    /// The shareable message handler for the subscription.
    pub handler: ShareableMessageHandler,
    /// A copy of the handler ID for faster equality checks.
    pub handler_id: Ustr,
    /// The pattern for the subscription.
    pub pattern: MStr<Pattern>,
    /// The priority for the subscription: higher priority handlers receive
    /// messages before lower priority handlers.
    pub priority: u8,
}

impl Subscription {
    /// Creates a new [`Subscription`] instance.
    #[must_use]
    pub fn new(
        pattern: MStr<Pattern>,
        handler: ShareableMessageHandler,
        priority: Option<u8>,
    ) -> Self {
        Self {
            handler_id: handler.id(),
            pattern,
            handler,
            priority: priority.unwrap_or(0),
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subscription {{ pattern: {}, handler: {}, priority: {} }}",
            self.pattern, self.handler_id, self.priority
        )
    }
}

impl PartialEq<Self> for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.handler_id == other.handler_id
    }
}

impl Eq for Subscription {}

impl Hash for Subscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
        self.handler_id.hash(state);
    }
}

/// Sorts subscriptions into dispatch order: priority descending, stable on
/// ties so equal-priority handlers keep their registration order.
fn sort_for_dispatch(subs: &mut [Subscription]) {
    subs.sort_by(|a, b| b.priority.cmp(&a.priority));
}

/// A generic message bus to facilitate various messaging patterns.
///
/// The bus provides both a producer and consumer API for Pub/Sub, Req/Rep, as
/// well as direct point-to-point messaging to registered endpoints.
///
/// Pub/Sub wildcard patterns for hierarchical topics are possible:
///  - `*` asterisk represents zero or more characters in a pattern.
///  - `?` question mark represents a single character in a pattern.
///
/// The asterisk in a wildcard matches any character zero or more times. For
/// example, `comp*` matches anything beginning with `comp` which means `comp`,
/// `complete`, and `computer` are all matched.
///
/// A question mark matches a single character once. For example, `c?mp`
/// matches `camp` and `comp`. The question mark can also be used more than
/// once. For example, `c??p` would match both of the above examples and
/// `coop`.
///
/// # Thread safety
///
/// The bus is explicitly **not** thread-safe and must only be used from its
/// owning thread; see [`get_message_bus`](super::get_message_bus) for the
/// thread-local owning instance.
pub struct MessageBus {
    /// The trader ID associated with the message bus.
    pub trader_id: TraderId,
    /// The instance ID associated with the message bus.
    pub instance_id: UUID4,
    /// The name for the message bus.
    pub name: String,
    /// If the message bus is backed by an external sink.
    pub has_backing: bool,
    /// The count of messages sent to endpoints.
    pub sent_count: u64,
    /// The count of requests dispatched.
    pub req_count: u64,
    /// The count of responses dispatched.
    pub res_count: u64,
    /// The count of messages published.
    pub pub_count: u64,
    /// Active subscriptions, each annotated with the cached concrete topics
    /// whose resolution currently contains it (kept sorted).
    pub(crate) subscriptions: IndexMap<Subscription, Vec<MStr<Topic>>>,
    /// The resolution cache: maps a concrete topic to its matching
    /// subscriptions in dispatch order. Populated lazily on first publish.
    pub(crate) topics: IndexMap<MStr<Topic>, Vec<Subscription>>,
    /// Index of endpoint addresses and their handlers.
    pub(crate) endpoints: IndexMap<MStr<Endpoint>, ShareableMessageHandler>,
    /// Index of request correlation IDs and their response handlers.
    pub(crate) correlation_index: AHashMap<UUID4, ShareableMessageHandler>,
    /// The message type names eligible for external publishing.
    pub(crate) publishable_types: AHashSet<Ustr>,
    serializer: Option<Box<dyn MessageSerializer>>,
    database: Option<Box<dyn MessageBusDatabase>>,
}

impl MessageBus {
    /// Creates a new [`MessageBus`] instance.
    ///
    /// A fresh instance ID is generated when `instance_id` is `None`, and the
    /// name defaults to `"MessageBus"`. The configuration's `types_filter` is
    /// consumed here: the publishable set is the external publishing universe
    /// with the filtered type names removed.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is empty, all whitespace, or non-ASCII.
    pub fn new_checked(
        trader_id: TraderId,
        instance_id: Option<UUID4>,
        name: Option<String>,
        serializer: Option<Box<dyn MessageSerializer>>,
        database: Option<Box<dyn MessageBusDatabase>>,
        config: Option<MessageBusConfig>,
    ) -> anyhow::Result<Self> {
        let name = name.unwrap_or_else(|| stringify!(MessageBus).to_owned());
        check_valid_string(&name, stringify!(name))?;

        let config = config.unwrap_or_default();
        let types_filter = config.types_filter.unwrap_or_default();
        let publishable_types = EXTERNAL_PUBLISHING_TYPES
            .iter()
            .copied()
            .filter(|type_name| !types_filter.iter().any(|filtered| filtered == type_name))
            .map(Ustr::from)
            .collect();

        Ok(Self {
            trader_id,
            instance_id: instance_id.unwrap_or_default(),
            name,
            has_backing: database.is_some(),
            sent_count: 0,
            req_count: 0,
            res_count: 0,
            pub_count: 0,
            subscriptions: IndexMap::new(),
            topics: IndexMap::new(),
            endpoints: IndexMap::new(),
            correlation_index: AHashMap::new(),
            publishable_types,
            serializer,
            database,
        })
    }

    /// Creates a new [`MessageBus`] instance.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid string.
    #[must_use]
    pub fn new(
        trader_id: TraderId,
        instance_id: Option<UUID4>,
        name: Option<String>,
        serializer: Option<Box<dyn MessageSerializer>>,
        database: Option<Box<dyn MessageBusDatabase>>,
        config: Option<MessageBusConfig>,
    ) -> Self {
        Self::new_checked(trader_id, instance_id, name, serializer, database, config)
            .expect(FAILED)
    }

    /// Returns the memory address of this instance as a hexadecimal string.
    #[must_use]
    pub fn mem_address(&self) -> String {
        format!("{self:p}")
    }

    /// Returns the registered endpoint addresses.
    #[must_use]
    pub fn endpoints(&self) -> Vec<&str> {
        self.endpoints.keys().map(|e| e.as_str()).collect()
    }

    /// Returns the sorted unique set of subscribed topic patterns.
    #[must_use]
    pub fn topics(&self) -> Vec<&str> {
        let mut patterns: Vec<&str> = self
            .subscriptions
            .keys()
            .map(|s| s.pattern.as_str())
            .collect();
        patterns.sort_unstable();
        patterns.dedup();
        patterns
    }

    /// Returns the subscriptions whose topic pattern is matched by the given
    /// `pattern`; `None` means all subscriptions (equivalent to `*`).
    #[must_use]
    pub fn subscriptions(&self, pattern: Option<MStr<Pattern>>) -> Vec<&Subscription> {
        match pattern {
            Some(pattern) => self
                .subscriptions
                .keys()
                .filter(|s| is_matching_bytes(s.pattern.as_bytes(), pattern.as_bytes()))
                .collect(),
            None => self.subscriptions.keys().collect(),
        }
    }

    /// Returns the handler IDs for actively subscribed patterns.
    #[must_use]
    pub fn subscription_handler_ids(&self) -> Vec<&str> {
        self.subscriptions
            .keys()
            .map(|s| s.handler_id.as_str())
            .collect()
    }

    /// Returns whether there are subscribers matched by the given `pattern`.
    #[must_use]
    pub fn has_subscribers(&self, pattern: MStr<Pattern>) -> bool {
        !self.subscriptions(Some(pattern)).is_empty()
    }

    /// Returns the count of subscribers matched by the given `pattern`.
    #[must_use]
    pub fn subscriptions_count(&self, pattern: MStr<Pattern>) -> usize {
        self.subscriptions(Some(pattern)).len()
    }

    /// Returns whether the `handler` is subscribed to the `pattern`.
    #[must_use]
    pub fn is_subscribed(&self, pattern: MStr<Pattern>, handler: ShareableMessageHandler) -> bool {
        let sub = Subscription::new(pattern, handler, None);
        self.subscriptions.contains_key(&sub)
    }

    /// Returns whether the `endpoint` is registered.
    #[must_use]
    pub fn is_registered(&self, endpoint: MStr<Endpoint>) -> bool {
        self.endpoints.contains_key(&endpoint)
    }

    /// Returns whether there is a pending request for the `request_id`.
    #[must_use]
    pub fn is_pending_request(&self, request_id: &UUID4) -> bool {
        self.correlation_index.contains_key(request_id)
    }

    /// Returns the handler for the `endpoint`.
    #[must_use]
    pub fn get_endpoint(&self, endpoint: MStr<Endpoint>) -> Option<&ShareableMessageHandler> {
        self.endpoints.get(&endpoint)
    }

    /// Registers the `handler` at the `endpoint` address.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler is already registered at the `endpoint`.
    pub fn register(
        &mut self,
        endpoint: MStr<Endpoint>,
        handler: ShareableMessageHandler,
    ) -> anyhow::Result<()> {
        check_predicate_true(
            !self.endpoints.contains_key(&endpoint),
            &format!("endpoint '{endpoint}' already registered"),
        )?;

        self.endpoints.insert(endpoint, handler);

        Ok(())
    }

    /// Deregisters the `handler` from the `endpoint` address.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler is registered at the `endpoint`, or if
    /// the registered handler is not the given `handler`.
    pub fn deregister(
        &mut self,
        endpoint: MStr<Endpoint>,
        handler: &ShareableMessageHandler,
    ) -> anyhow::Result<()> {
        match self.endpoints.get(&endpoint) {
            None => anyhow::bail!("no handler registered at endpoint '{endpoint}'"),
            Some(existing) if existing.id() != handler.id() => anyhow::bail!(
                "handler '{}' does not match the handler registered at endpoint '{endpoint}'",
                handler.id()
            ),
            Some(_) => {
                self.endpoints.shift_remove(&endpoint);
                Ok(())
            }
        }
    }

    /// Subscribes the `handler` to the `pattern` with an optional `priority`
    /// (default 0).
    ///
    /// A duplicate subscription (same pattern and handler) is logged and
    /// dropped; the existing priority is **not** updated. Every cached
    /// concrete topic the pattern matches has its resolution rewritten so the
    /// new subscription takes effect for already-published topics.
    pub fn subscribe(
        &mut self,
        pattern: MStr<Pattern>,
        handler: ShareableMessageHandler,
        priority: Option<u8>,
    ) {
        let sub = Subscription::new(pattern, handler, priority);
        if self.subscriptions.contains_key(&sub) {
            log::error!("{sub:?} already exists");
            return;
        }

        // Rewrite the cached resolution of every concrete topic this pattern matches
        let mut matched_topics = Vec::new();
        for (topic, subs) in &mut self.topics {
            if is_matching(*topic, pattern) {
                subs.push(sub.clone());
                sort_for_dispatch(subs);
                matched_topics.push(*topic);
            }
        }

        matched_topics.sort_unstable();

        self.subscriptions.insert(sub, matched_topics);
    }

    /// Unsubscribes the `handler` from the `pattern`.
    ///
    /// An unknown subscription is logged as a warning and dropped. The cached
    /// resolution of every concrete topic annotated against the subscription
    /// is rewritten; emptied cache entries are retained.
    pub fn unsubscribe(&mut self, pattern: MStr<Pattern>, handler: ShareableMessageHandler) {
        let sub = Subscription::new(pattern, handler, None);
        match self.subscriptions.shift_remove(&sub) {
            Some(matched_topics) => {
                for topic in matched_topics {
                    if let Some(subs) = self.topics.get_mut(&topic) {
                        subs.retain(|s| s != &sub);
                    }
                }
            }
            None => log::warn!("{sub:?} not found"),
        }
    }

    /// Finds the subscriptions with pattern matching the `topic` by scanning
    /// the subscription index.
    pub(crate) fn find_topic_matches(&self, topic: MStr<Topic>) -> Vec<Subscription> {
        self.subscriptions
            .keys()
            .filter(|sub| is_matching(topic, sub.pattern))
            .cloned()
            .collect()
    }

    /// Returns the subscriptions matching the `topic` in dispatch order,
    /// resolving and caching on first sight of the topic.
    ///
    /// The returned vector is a snapshot: callers iterate it while handlers
    /// may re-enter the bus and mutate subscriptions.
    #[must_use]
    pub fn matching_subscriptions(&mut self, topic: MStr<Topic>) -> Vec<Subscription> {
        if let Some(subs) = self.topics.get(&topic) {
            return subs.clone();
        }
        self.resolve_topic(topic)
    }

    fn resolve_topic(&mut self, topic: MStr<Topic>) -> Vec<Subscription> {
        let mut matches = self.find_topic_matches(topic);
        sort_for_dispatch(&mut matches);

        // Annotate each matching subscription with the newly cached topic
        for sub in &matches {
            if let Some(matched_topics) = self.subscriptions.get_mut(sub) {
                if let Err(idx) = matched_topics.binary_search(&topic) {
                    matched_topics.insert(idx, topic);
                }
            }
        }

        self.topics.insert(topic, matches.clone());
        matches
    }

    /// Registers a response handler for the `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler is already registered for the
    /// `correlation_id`.
    pub fn register_response_handler(
        &mut self,
        correlation_id: &UUID4,
        handler: ShareableMessageHandler,
    ) -> anyhow::Result<()> {
        check_predicate_true(
            !self.correlation_index.contains_key(correlation_id),
            &format!("correlation ID <{correlation_id}> already has a registered handler"),
        )?;

        self.correlation_index.insert(*correlation_id, handler);

        Ok(())
    }

    /// Removes and returns the response handler for the `correlation_id`.
    #[must_use]
    pub fn pop_response_handler(
        &mut self,
        correlation_id: &UUID4,
    ) -> Option<ShareableMessageHandler> {
        self.correlation_index.remove(correlation_id)
    }

    /// Serializes the `message` and hands it to the external sink, when one
    /// is configured, a serializer is available, and the message's concrete
    /// type is publishable.
    ///
    /// Serialization failures are logged and swallowed.
    pub(crate) fn publish_external(&self, topic: MStr<Topic>, message: &dyn Any) {
        if !self.has_backing {
            return;
        }
        let Some(serializer) = &self.serializer else {
            return;
        };
        let Some(type_name) = serializer.type_name(message) else {
            return;
        };
        if !self.publishable_types.contains(&type_name) {
            return;
        }
        if let Some(database) = &self.database {
            match serializer.serialize(message) {
                Ok(payload) => database.publish(*topic, payload),
                Err(e) => log::error!("Failed to serialize message for topic '{topic}': {e}"),
            }
        }
    }

    /// Closes the message bus, releasing the external sink handle if one is
    /// open.
    ///
    /// # Errors
    ///
    /// This function never currently returns an error.
    pub fn close(&mut self) -> anyhow::Result<()> {
        if let Some(database) = self.database.as_mut() {
            if !database.is_closed() {
                database.close();
            }
        }

        Ok(())
    }
}

impl Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(MessageBus))
            .field("trader_id", &self.trader_id)
            .field("instance_id", &self.instance_id)
            .field("name", &self.name)
            .field("has_backing", &self.has_backing)
            .field("subscriptions", &self.subscriptions.len())
            .field("topics", &self.topics.len())
            .field("endpoints", &self.endpoints.len())
            .field("correlation_index", &self.correlation_index.len())
            .finish()
    }
}

impl Default for MessageBus {
    /// Creates a new default [`MessageBus`] instance.
    fn default() -> Self {
        Self::new(TraderId::from("TRADER-001"), None, None, None, None, None)
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        if let Some(database) = self.database.as_mut() {
            if !database.is_closed() {
                database.close();
            }
        }
    }
}
