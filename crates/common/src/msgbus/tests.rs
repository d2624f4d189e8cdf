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

use std::{cell::RefCell, rc::Rc};

use bytes::Bytes;
use meridian_core::{UUID4, identifiers::TraderId};
use rand::{RngExt, SeedableRng, rngs::StdRng};
use regex::Regex;
use rstest::rstest;
use ustr::Ustr;

use crate::msgbus::{
    self, DatabaseConfig, MStr, MessageBus, MessageBusConfig, Request, Response,
    Subscription, Topic, TypedMessageHandler,
    get_message_bus,
    handler::ShareableMessageHandler,
    matching::{is_matching, is_matching_bytes},
    set_message_bus,
    stubs::{
        StubMessageBusDatabase, StubMessageSerializer, StubQuoteTick, StubTradeTick,
        check_handler_was_called, get_call_check_shareable_handler, get_message_saving_handler,
        get_saved_messages, get_stub_shareable_handler,
    },
};

/// Asserts the bidirectional coherence of the subscription index and the
/// resolution cache: a topic is annotated against a subscription exactly when
/// the topic's cached resolution contains it, and every cached resolution
/// equals a fresh priority-descending resolve against the index.
fn check_cache_coherent(msgbus: &MessageBus) {
    for (sub, matched_topics) in &msgbus.subscriptions {
        for topic in matched_topics {
            let cached = msgbus
                .topics
                .get(topic)
                .expect("annotated topic should have a cache entry");
            assert!(
                cached.contains(sub),
                "cache entry for '{topic}' missing {sub:?}"
            );
        }
    }

    for (topic, cached) in &msgbus.topics {
        for sub in cached {
            let matched_topics = msgbus
                .subscriptions
                .get(sub)
                .expect("cached subscription should be in the index");
            assert!(
                matched_topics.binary_search(topic).is_ok(),
                "{sub:?} not annotated with topic '{topic}'"
            );
        }

        let mut expected: Vec<Subscription> = msgbus
            .subscriptions
            .keys()
            .filter(|s| is_matching(*topic, s.pattern))
            .cloned()
            .collect();
        expected.sort_by(|a, b| b.priority.cmp(&a.priority));
        assert_eq!(
            cached, &expected,
            "cache entry for '{topic}' diverges from a fresh resolve"
        );
    }
}

/// Builds a recording handler which pushes `label` on every delivery.
fn recording_handler(label: &'static str, calls: &Rc<RefCell<Vec<String>>>) -> ShareableMessageHandler {
    let calls = calls.clone();
    ShareableMessageHandler(Rc::new(TypedMessageHandler::new(
        Some(label),
        move |_: &String| calls.borrow_mut().push(label.to_owned()),
    )))
}

#[rstest]
fn test_new() {
    let trader_id = TraderId::from("TRADER-001");
    let msgbus = MessageBus::new(trader_id, None, None, None, None, None);

    assert_eq!(msgbus.trader_id, trader_id);
    assert_eq!(msgbus.name, stringify!(MessageBus));
    assert!(!msgbus.has_backing);
    assert_eq!(msgbus.sent_count, 0);
    assert_eq!(msgbus.req_count, 0);
    assert_eq!(msgbus.res_count, 0);
    assert_eq!(msgbus.pub_count, 0);
}

#[rstest]
fn test_new_generates_instance_id_when_absent() {
    let bus1 = MessageBus::default();
    let bus2 = MessageBus::default();

    assert_ne!(bus1.instance_id, bus2.instance_id);
}

#[rstest]
fn test_new_checked_rejects_invalid_name() {
    let result = MessageBus::new_checked(
        TraderId::from("TRADER-001"),
        None,
        Some("  ".to_owned()),
        None,
        None,
        None,
    );

    assert!(result.is_err());
}

#[rstest]
fn test_endpoints_when_no_endpoints() {
    let msgbus = get_message_bus();
    assert!(msgbus.borrow().endpoints().is_empty());
}

#[rstest]
fn test_topics_when_no_subscriptions() {
    let msgbus = get_message_bus();
    assert!(msgbus.borrow().topics().is_empty());
    assert!(!msgbus.borrow().has_subscribers("my-topic".into()));
}

#[rstest]
fn test_is_subscribed_when_no_subscriptions() {
    let msgbus = get_message_bus();
    let handler = get_stub_shareable_handler(None);

    assert!(!msgbus.borrow().is_subscribed("my-topic".into(), handler));
}

#[rstest]
fn test_is_registered_when_no_registrations() {
    let msgbus = get_message_bus();
    assert!(!msgbus.borrow().is_registered("MyEndpoint".into()));
}

#[rstest]
fn test_is_pending_request_when_no_requests() {
    assert!(!msgbus::is_pending_request(&UUID4::new()));
}

#[rstest]
fn test_register_endpoint() {
    let msgbus = get_message_bus();
    let endpoint = "MyEndpoint".into();
    let handler = get_stub_shareable_handler(None);

    msgbus::register(endpoint, handler).unwrap();

    assert_eq!(msgbus.borrow().endpoints(), vec!["MyEndpoint"]);
    assert!(msgbus.borrow().get_endpoint(endpoint).is_some());
    assert!(msgbus::is_registered(endpoint));
}

#[rstest]
fn test_register_duplicate_endpoint_errors() {
    let endpoint = "MyEndpoint".into();

    msgbus::register(endpoint, get_stub_shareable_handler(None)).unwrap();
    let result = msgbus::register(endpoint, get_stub_shareable_handler(None));

    assert!(result.is_err());
}

#[rstest]
fn test_deregister_endpoint() {
    let msgbus = get_message_bus();
    let endpoint = "MyEndpoint".into();
    let handler = get_stub_shareable_handler(None);

    msgbus::register(endpoint, handler.clone()).unwrap();
    msgbus::deregister(endpoint, &handler).unwrap();

    assert!(msgbus.borrow().endpoints().is_empty());
}

#[rstest]
fn test_deregister_unknown_endpoint_errors() {
    let handler = get_stub_shareable_handler(None);

    let result = msgbus::deregister("MissingEndpoint".into(), &handler);

    assert!(result.is_err());
}

#[rstest]
fn test_deregister_handler_mismatch_errors() {
    let msgbus = get_message_bus();
    let endpoint = "MyEndpoint".into();
    let registered = get_stub_shareable_handler(None);
    let other = get_stub_shareable_handler(None);

    msgbus::register(endpoint, registered).unwrap();
    let result = msgbus::deregister(endpoint, &other);

    assert!(result.is_err());
    assert!(msgbus.borrow().get_endpoint(endpoint).is_some());
}

#[rstest]
fn test_endpoint_send() {
    let endpoint = "MyEndpoint".into();
    let handler = get_call_check_shareable_handler(None);

    msgbus::register(endpoint, handler.clone()).unwrap();
    assert!(!check_handler_was_called(handler.clone()));

    msgbus::send(endpoint, &"Test Message");

    assert!(check_handler_was_called(handler));
    assert_eq!(get_message_bus().borrow().sent_count, 1);
}

#[rstest]
fn test_send_to_unknown_endpoint_is_non_fatal() {
    msgbus::send("nope".into(), &"Test Message");

    assert_eq!(get_message_bus().borrow().sent_count, 0);
}

#[rstest]
fn test_request_response_round_trip() {
    let endpoint = "svc".into();
    let endpoint_handler = get_message_saving_handler::<Request>(None);
    msgbus::register(endpoint, endpoint_handler.clone()).unwrap();

    let callback = get_message_saving_handler::<Response>(None);
    let request_id = UUID4::new();
    let req = Request::new(request_id, callback.clone(), Rc::new("query".to_owned()));

    msgbus::request(endpoint, req);

    assert!(msgbus::is_pending_request(&request_id));
    let received = get_saved_messages::<Request>(endpoint_handler);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].request_id, request_id);

    msgbus::response(Response::new(request_id, Rc::new("result".to_owned())));

    assert!(!msgbus::is_pending_request(&request_id));
    let responses = get_saved_messages::<Response>(callback);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].correlation_id, request_id);

    let msgbus = get_message_bus();
    assert_eq!(msgbus.borrow().req_count, 1);
    assert_eq!(msgbus.borrow().res_count, 1);
}

#[rstest]
fn test_duplicate_request_id_dropped() {
    let endpoint = "svc".into();
    let endpoint_handler = get_message_saving_handler::<Request>(None);
    msgbus::register(endpoint, endpoint_handler.clone()).unwrap();

    let first_callback = get_message_saving_handler::<Response>(None);
    let second_callback = get_message_saving_handler::<Response>(None);
    let request_id = UUID4::new();

    msgbus::request(
        endpoint,
        Request::new(request_id, first_callback.clone(), Rc::new(1_u32)),
    );
    msgbus::request(
        endpoint,
        Request::new(request_id, second_callback.clone(), Rc::new(2_u32)),
    );

    // Second request dropped entirely
    assert_eq!(get_message_bus().borrow().req_count, 1);
    assert_eq!(get_saved_messages::<Request>(endpoint_handler).len(), 1);

    msgbus::response(Response::new(request_id, Rc::new(3_u32)));

    assert_eq!(get_saved_messages::<Response>(first_callback).len(), 1);
    assert!(get_saved_messages::<Response>(second_callback).is_empty());
}

#[rstest]
fn test_response_with_unknown_correlation_is_non_fatal() {
    msgbus::response(Response::new(UUID4::new(), Rc::new(())));

    assert_eq!(get_message_bus().borrow().res_count, 0);
}

#[rstest]
fn test_request_to_unknown_endpoint_retains_correlation_entry() {
    let callback = get_message_saving_handler::<Response>(None);
    let request_id = UUID4::new();

    msgbus::request(
        "missing".into(),
        Request::new(request_id, callback.clone(), Rc::new(())),
    );

    // No dispatch happened, yet the correlation entry is live
    assert_eq!(get_message_bus().borrow().req_count, 0);
    assert!(msgbus::is_pending_request(&request_id));

    // A response can therefore still be delivered later
    msgbus::response(Response::new(request_id, Rc::new(())));
    assert_eq!(get_saved_messages::<Response>(callback).len(), 1);
}

#[rstest]
fn test_subscribe() {
    let msgbus = get_message_bus();
    let handler = get_stub_shareable_handler(None);

    msgbus::subscribe_str("my-topic", handler.clone(), Some(1));

    assert!(msgbus.borrow().has_subscribers("my-topic".into()));
    assert!(msgbus::is_subscribed("my-topic".into(), handler));
    assert_eq!(msgbus.borrow().topics(), vec!["my-topic"]);
}

#[rstest]
fn test_subscribe_duplicate_keeps_existing_priority() {
    let msgbus = get_message_bus();
    let handler = get_stub_shareable_handler(Some(Ustr::from("h-1")));

    msgbus::subscribe_str("my-topic", handler.clone(), Some(5));
    msgbus::subscribe_str("my-topic", handler, Some(42));

    let msgbus_ref = msgbus.borrow();
    let subs = msgbus_ref.subscriptions(None);
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].priority, 5);
}

#[rstest]
fn test_unsubscribe() {
    let msgbus = get_message_bus();
    let handler = get_stub_shareable_handler(None);

    msgbus::subscribe_str("my-topic", handler.clone(), None);
    msgbus::unsubscribe_str("my-topic", handler);

    assert!(!msgbus.borrow().has_subscribers("my-topic".into()));
    assert!(msgbus.borrow().topics().is_empty());
}

#[rstest]
fn test_unsubscribe_unknown_is_non_fatal() {
    let handler = get_stub_shareable_handler(None);

    msgbus::unsubscribe_str("never-subscribed", handler);

    assert!(get_message_bus().borrow().topics().is_empty());
}

#[rstest]
fn test_matching_subscriptions_priority_order() {
    let msgbus = get_message_bus();
    let pattern = "my-pattern";

    let handler_id1 = Ustr::from("1");
    let handler_id2 = Ustr::from("2");
    let handler_id3 = Ustr::from("3");
    let handler_id4 = Ustr::from("4");

    msgbus::subscribe_str(pattern, get_stub_shareable_handler(Some(handler_id1)), None);
    msgbus::subscribe_str(pattern, get_stub_shareable_handler(Some(handler_id2)), None);
    msgbus::subscribe_str(
        pattern,
        get_stub_shareable_handler(Some(handler_id3)),
        Some(1),
    );
    msgbus::subscribe_str(
        pattern,
        get_stub_shareable_handler(Some(handler_id4)),
        Some(2),
    );

    let subs = msgbus.borrow_mut().matching_subscriptions(pattern.into());
    assert_eq!(subs.len(), 4);
    assert_eq!(subs[0].handler_id, handler_id4);
    assert_eq!(subs[1].handler_id, handler_id3);
    assert_eq!(subs[2].handler_id, handler_id1);
    assert_eq!(subs[3].handler_id, handler_id2);
}

#[rstest]
fn test_publish_priority_order_stable_on_ties() {
    let calls: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let topic: MStr<Topic> = "data.trades.BINANCE".into();

    msgbus::subscribe_str("data.trades.BINANCE", recording_handler("h1", &calls), Some(10));
    msgbus::subscribe_str("data.trades.*", recording_handler("h2", &calls), Some(5));
    msgbus::subscribe_str("data.*", recording_handler("h3", &calls), Some(10));

    msgbus::publish(topic, &"msg".to_owned());

    // Equal priorities dispatch in registration order
    assert_eq!(*calls.borrow(), vec!["h1", "h3", "h2"]);
}

#[rstest]
fn test_publish_wildcard_dispatch() {
    let wildcard_handler = get_message_saving_handler::<String>(Some(Ustr::from("wildcard")));
    let concrete_handler = get_message_saving_handler::<String>(Some(Ustr::from("concrete")));

    msgbus::subscribe_str("data.*", wildcard_handler.clone(), None);
    msgbus::subscribe_str("data.trade", concrete_handler.clone(), None);

    msgbus::publish("data.trade".into(), &"trade".to_owned());
    msgbus::publish("data.book".into(), &"book".to_owned());

    assert_eq!(
        get_saved_messages::<String>(wildcard_handler),
        vec!["trade".to_owned(), "book".to_owned()]
    );
    assert_eq!(
        get_saved_messages::<String>(concrete_handler),
        vec!["trade".to_owned()]
    );
}

#[rstest]
fn test_subscribe_after_publish_rewrites_cache() {
    let msgbus = get_message_bus();
    let topic: MStr<Topic> = "data.trades.BINANCE".into();

    // Cache the topic with no subscribers
    msgbus::publish(topic, &"m1".to_owned());

    let handler = get_message_saving_handler::<String>(None);
    msgbus::subscribe_str("data.trades.*", handler.clone(), None);
    check_cache_coherent(&msgbus.borrow());

    msgbus::publish(topic, &"m2".to_owned());

    assert_eq!(
        get_saved_messages::<String>(handler),
        vec!["m2".to_owned()]
    );
}

#[rstest]
fn test_unsubscribe_after_publish_rewrites_cache() {
    let msgbus = get_message_bus();
    let topic: MStr<Topic> = "data.trades.BINANCE".into();
    let handler = get_message_saving_handler::<String>(None);

    msgbus::subscribe_str("data.trades.*", handler.clone(), None);
    msgbus::publish(topic, &"m1".to_owned());

    msgbus::unsubscribe_str("data.trades.*", handler.clone());
    check_cache_coherent(&msgbus.borrow());

    // The emptied cache entry is retained and dispatches to no one
    msgbus::publish(topic, &"m2".to_owned());

    assert_eq!(
        get_saved_messages::<String>(handler),
        vec!["m1".to_owned()]
    );
    assert_eq!(msgbus.borrow().pub_count, 2);
}

#[rstest]
fn test_reentrant_subscribe_during_publish() {
    let calls: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let topic: MStr<Topic> = "data.trades.BINANCE".into();

    let late_handler = recording_handler("late", &calls);

    let calls_first = calls.clone();
    let late_clone = late_handler.clone();
    let first_handler = ShareableMessageHandler(Rc::new(TypedMessageHandler::new(
        Some("first"),
        move |_: &String| {
            calls_first.borrow_mut().push("first".to_owned());
            msgbus::subscribe_str("data.trades.*", late_clone.clone(), None);
        },
    )));
    msgbus::subscribe_str("data.trades.*", first_handler, None);

    // In-flight dispatch iterates the pre-mutation snapshot
    msgbus::publish(topic, &"m1".to_owned());
    assert_eq!(*calls.borrow(), vec!["first"]);

    // Subsequent publishes observe the post-mutation state
    msgbus::publish(topic, &"m2".to_owned());
    assert_eq!(*calls.borrow(), vec!["first", "first", "late"]);
}

#[rstest]
fn test_reentrant_unsubscribe_during_publish() {
    let calls: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let topic: MStr<Topic> = "data.trades.BINANCE".into();

    let second_handler = recording_handler("second", &calls);

    let calls_first = calls.clone();
    let second_clone = second_handler.clone();
    let first_handler = ShareableMessageHandler(Rc::new(TypedMessageHandler::new(
        Some("first"),
        move |_: &String| {
            calls_first.borrow_mut().push("first".to_owned());
            msgbus::unsubscribe_str("data.trades.*", second_clone.clone());
        },
    )));

    // Higher priority, so the unsubscribing handler runs first
    msgbus::subscribe_str("data.trades.*", first_handler, Some(1));
    msgbus::subscribe_str("data.trades.*", second_handler, None);

    // The snapshot still delivers the in-flight message to the second handler
    msgbus::publish(topic, &"m1".to_owned());
    assert_eq!(*calls.borrow(), vec!["first", "second"]);

    msgbus::publish(topic, &"m2".to_owned());
    assert_eq!(*calls.borrow(), vec!["first", "second", "first"]);
}

#[rstest]
fn test_external_publish_type_filter() {
    let database = StubMessageBusDatabase::default();
    let config = MessageBusConfig {
        database: Some(DatabaseConfig::default()),
        types_filter: Some(vec!["QuoteTick".to_owned()]),
        ..Default::default()
    };
    let bus = MessageBus::new(
        TraderId::from("TRADER-001"),
        None,
        None,
        Some(Box::new(StubMessageSerializer)),
        Some(Box::new(database.clone())),
        Some(config),
    );
    assert!(bus.has_backing);
    set_message_bus(Rc::new(RefCell::new(bus)));

    let handler = get_call_check_shareable_handler(None);
    msgbus::subscribe_str("data.*", handler.clone(), None);

    let quote = StubQuoteTick {
        instrument: "ETHUSDT".to_owned(),
        bid: 100.0,
        ask: 101.0,
    };
    msgbus::publish("data.quotes.BINANCE".into(), &quote);

    // In-process dispatch happened, external emission was filtered
    assert!(check_handler_was_called(handler));
    assert!(database.published().is_empty());

    let trade = StubTradeTick {
        instrument: "ETHUSDT".to_owned(),
        price: 100.5,
        size: 2.0,
    };
    msgbus::publish("data.trades.BINANCE".into(), &trade);

    let published = database.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic.as_str(), "data.trades.BINANCE");
    assert_eq!(
        published[0].payload,
        Bytes::from(serde_json::to_vec(&trade).unwrap())
    );
    assert_eq!(get_message_bus().borrow().pub_count, 2);
}

#[rstest]
fn test_external_publish_requires_serializer() {
    let database = StubMessageBusDatabase::default();
    let bus = MessageBus::new(
        TraderId::from("TRADER-001"),
        None,
        None,
        None,
        Some(Box::new(database.clone())),
        None,
    );
    set_message_bus(Rc::new(RefCell::new(bus)));

    let trade = StubTradeTick {
        instrument: "ETHUSDT".to_owned(),
        price: 100.5,
        size: 2.0,
    };
    msgbus::publish("data.trades.BINANCE".into(), &trade);

    assert!(database.published().is_empty());
    assert_eq!(get_message_bus().borrow().pub_count, 1);
}

#[rstest]
fn test_unknown_type_not_published_externally() {
    let database = StubMessageBusDatabase::default();
    let bus = MessageBus::new(
        TraderId::from("TRADER-001"),
        None,
        None,
        Some(Box::new(StubMessageSerializer)),
        Some(Box::new(database.clone())),
        None,
    );
    set_message_bus(Rc::new(RefCell::new(bus)));

    msgbus::publish("data.misc".into(), &"not a platform type".to_owned());

    assert!(database.published().is_empty());
    assert_eq!(get_message_bus().borrow().pub_count, 1);
}

#[rstest]
fn test_counters_increment_once_per_successful_dispatch() {
    let endpoint = "svc".into();
    msgbus::register(endpoint, get_message_saving_handler::<String>(None)).unwrap();
    msgbus::subscribe_str("data.*", get_stub_shareable_handler(None), None);

    msgbus::send(endpoint, &"one".to_owned());
    msgbus::send("unknown".into(), &"dropped".to_owned());
    msgbus::publish("data.trade".into(), &"two".to_owned());
    msgbus::publish("other.topic".into(), &"three".to_owned());

    let request_id = UUID4::new();
    let request_endpoint = "req-svc".into();
    msgbus::register(request_endpoint, get_message_saving_handler::<Request>(None)).unwrap();
    msgbus::request(
        request_endpoint,
        Request::new(
            request_id,
            get_message_saving_handler::<Response>(None),
            Rc::new(()),
        ),
    );
    msgbus::response(Response::new(request_id, Rc::new(())));
    msgbus::response(Response::new(UUID4::new(), Rc::new(()))); // Unknown, dropped

    let msgbus = get_message_bus();
    assert_eq!(msgbus.borrow().sent_count, 1);
    assert_eq!(msgbus.borrow().pub_count, 2);
    assert_eq!(msgbus.borrow().req_count, 1);
    assert_eq!(msgbus.borrow().res_count, 1);
}

#[rstest]
fn test_topics_sorted_unique() {
    let msgbus = get_message_bus();

    msgbus::subscribe_str("orders.*", get_stub_shareable_handler(None), None);
    msgbus::subscribe_str("data.*", get_stub_shareable_handler(None), None);
    msgbus::subscribe_str("orders.*", get_stub_shareable_handler(None), None);

    assert_eq!(msgbus.borrow().topics(), vec!["data.*", "orders.*"]);
}

#[rstest]
fn test_subscriptions_introspection_by_pattern() {
    let msgbus = get_message_bus();

    msgbus::subscribe_str("data.trade", get_stub_shareable_handler(None), None);
    msgbus::subscribe_str("data.book", get_stub_shareable_handler(None), None);
    msgbus::subscribe_str("orders.new", get_stub_shareable_handler(None), None);

    let msgbus_ref = msgbus.borrow();
    assert_eq!(msgbus_ref.subscriptions(None).len(), 3);
    assert_eq!(msgbus_ref.subscriptions(Some("data.*".into())).len(), 2);
    assert_eq!(msgbus_ref.subscriptions_count("data.*".into()), 2);
    assert!(msgbus_ref.has_subscribers("data.*".into()));
    assert!(!msgbus_ref.has_subscribers("risk.*".into()));
    assert_eq!(msgbus_ref.subscription_handler_ids().len(), 3);
}

#[rstest]
fn test_drop_closes_database() {
    let database = StubMessageBusDatabase::default();
    {
        let _bus = MessageBus::new(
            TraderId::from("TRADER-001"),
            None,
            None,
            None,
            Some(Box::new(database.clone())),
            None,
        );
        assert!(!database.closed());
    }

    assert!(database.closed());
}

#[rstest]
fn test_close_releases_database() {
    let database = StubMessageBusDatabase::default();
    let mut bus = MessageBus::new(
        TraderId::from("TRADER-001"),
        None,
        None,
        None,
        Some(Box::new(database.clone())),
        None,
    );

    bus.close().unwrap();

    assert!(database.closed());
}

#[rstest]
#[case("a", "*", true)]
#[case("a", "a", true)]
#[case("a", "b", false)]
#[case("data.quotes.BINANCE", "data.*", true)]
#[case("data.quotes.BINANCE", "data.quotes*", true)]
#[case("data.quotes.BINANCE", "data.*.BINANCE", true)]
#[case("data.trades.BINANCE.ETHUSDT", "data.*.BINANCE.*", true)]
#[case("data.trades.BINANCE.ETHUSDT", "data.*.BINANCE.ETH*", true)]
#[case("data.trades.BINANCE.ETHUSDT", "data.*.BINANCE.ETH???", false)]
#[case("data.trades.BINANCE.ETHUSD", "data.*.BINANCE.ETH???", true)]
// [seq] style patterns are not supported: brackets match literally
#[case("data.trades.BINANCE.ETHUSDT", "data.*.BINANCE.ET[HC]USDT", false)]
#[case("data.trades.BINANCE.ETHUSDT", "data.*.BINANCE.ET[!ABC]USDT", false)]
#[case("data.trades.BINANCE.ETHUSDT", "data.*.BINANCE.ET[^ABC]USDT", false)]
fn test_is_matching(#[case] topic: &str, #[case] pattern: &str, #[case] expected: bool) {
    assert_eq!(is_matching(topic.into(), pattern.into()), expected);
}

fn convert_pattern_to_regex(pattern: &str) -> String {
    let mut regex = String::new();
    regex.push('^');

    for c in pattern.chars() {
        match c {
            '.' => regex.push_str("\\."),
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            _ => regex.push(c),
        }
    }

    regex.push('$');
    regex
}

fn generate_pattern_from_topic(topic: &str, rng: &mut StdRng) -> String {
    let mut pattern = String::new();

    for c in topic.chars() {
        let val: f64 = rng.random();
        // 10% chance of wildcard
        if val < 0.1 {
            pattern.push('*');
        }
        // 20% chance of question mark
        else if val < 0.3 {
            pattern.push('?');
        }
        // 20% chance of skipping
        else if val < 0.5 {
            continue;
        }
        // 50% chance of keeping the character
        else {
            pattern.push(c);
        }
    }

    if pattern.is_empty() {
        pattern.push('*');
    }

    pattern
}

fn create_topic(rng: &mut StdRng) -> String {
    let cat = ["data", "info", "order"];
    let model = ["quotes", "trades", "orderbooks", "depths"];
    let venue = ["BINANCE", "BYBIT", "OKX", "FTX", "KRAKEN"];
    let instrument = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT", "DOGEUSDT"];

    let cat = cat[rng.random_range(0..cat.len())];
    let model = model[rng.random_range(0..model.len())];
    let venue = venue[rng.random_range(0..venue.len())];
    let instrument = instrument[rng.random_range(0..instrument.len())];
    format!("{cat}.{model}.{venue}.{instrument}")
}

#[rstest]
fn test_matching_against_regex_oracle() {
    let topic = "data.quotes.BINANCE.ETHUSDT";
    let mut rng = StdRng::seed_from_u64(42);

    for i in 0..1000 {
        let pattern = generate_pattern_from_topic(topic, &mut rng);
        let regex_pattern = convert_pattern_to_regex(&pattern);
        let regex = Regex::new(&regex_pattern).unwrap();
        assert_eq!(
            is_matching_bytes(topic.as_bytes(), pattern.as_bytes()),
            regex.is_match(topic),
            "Mismatch on iteration {i}: pattern \"{pattern}\", topic {topic}, regex \"{regex_pattern}\""
        );
    }
}

/// A simple reference model for subscription behavior
struct SimpleSubscriptionModel {
    /// Stores (pattern, handler_id) tuples for active subscriptions
    subscriptions: Vec<(String, String)>,
}

impl SimpleSubscriptionModel {
    fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    fn subscribe(&mut self, pattern: &str, handler_id: &str) {
        let subscription = (pattern.to_owned(), handler_id.to_owned());
        if !self.subscriptions.contains(&subscription) {
            self.subscriptions.push(subscription);
        }
    }

    fn unsubscribe(&mut self, pattern: &str, handler_id: &str) {
        let subscription = (pattern.to_owned(), handler_id.to_owned());
        if let Some(idx) = self.subscriptions.iter().position(|s| s == &subscription) {
            self.subscriptions.remove(idx);
        }
    }

    fn is_subscribed(&self, pattern: &str, handler_id: &str) -> bool {
        self.subscriptions
            .contains(&(pattern.to_owned(), handler_id.to_owned()))
    }

    fn matching_subscriptions(&self, topic: &str) -> Vec<(String, String)> {
        self.subscriptions
            .iter()
            .filter(|(pat, _)| is_matching_bytes(topic.as_bytes(), pat.as_bytes()))
            .cloned()
            .collect()
    }

    fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[rstest]
fn subscription_model_fuzz_testing() {
    let mut rng = StdRng::seed_from_u64(42);

    let msgbus = get_message_bus();
    let mut model = SimpleSubscriptionModel::new();

    // Generate some patterns
    let mut patterns = vec![
        "data.*.*.*".to_owned(),
        "*.*.BINANCE.*".to_owned(),
        "order.trades.*".to_owned(),
        "data.*.*.?USDT".to_owned(),
        "*.trades.*.BTC*".to_owned(),
        "*.*.*.*".to_owned(),
    ];
    for _ in 0..20 {
        let topic = create_topic(&mut rng);
        patterns.push(generate_pattern_from_topic(&topic, &mut rng));
    }

    // Initialize handlers
    let handlers: Vec<(String, ShareableMessageHandler)> = (0..10)
        .map(|i| {
            let id = format!("handler_{i}");
            let handler = get_stub_shareable_handler(Some(Ustr::from(&id)));
            (id, handler)
        })
        .collect();

    let num_operations = 4000;
    for op_num in 0..num_operations {
        match rng.random_range(0..4) {
            // Subscribe
            0 => {
                let pattern = &patterns[rng.random_range(0..patterns.len())];
                let (handler_id, handler) = &handlers[rng.random_range(0..handlers.len())];

                model.subscribe(pattern, handler_id);
                msgbus::subscribe_str(pattern, handler.clone(), None);

                assert_eq!(
                    model.subscription_count(),
                    msgbus.borrow().subscriptions(None).len()
                );
                assert!(
                    msgbus::is_subscribed(pattern.as_str().into(), handler.clone()),
                    "Op {op_num}: is_subscribed should return true after subscribe"
                );
            }

            // Unsubscribe
            1 => {
                if model.subscription_count() > 0 {
                    let sub_idx = rng.random_range(0..model.subscription_count());
                    let (pattern, handler_id) = model.subscriptions[sub_idx].clone();

                    model.unsubscribe(&pattern, &handler_id);

                    let handler = handlers
                        .iter()
                        .find(|(id, _)| id == &handler_id)
                        .map(|(_, h)| h.clone())
                        .unwrap();
                    msgbus::unsubscribe_str(&pattern, handler.clone());

                    assert_eq!(
                        model.subscription_count(),
                        msgbus.borrow().subscriptions(None).len()
                    );
                    assert!(
                        !msgbus::is_subscribed(pattern.as_str().into(), handler),
                        "Op {op_num}: is_subscribed should return false after unsubscribe"
                    );
                }
            }

            // Check is_subscribed
            2 => {
                let pattern = &patterns[rng.random_range(0..patterns.len())];
                let (handler_id, handler) = &handlers[rng.random_range(0..handlers.len())];

                let expected = model.is_subscribed(pattern, handler_id);
                let actual = msgbus::is_subscribed(pattern.as_str().into(), handler.clone());

                assert_eq!(
                    expected, actual,
                    "Op {op_num}: subscription state mismatch for pattern '{pattern}', handler '{handler_id}'"
                );
            }

            // Publish and check the resolved matches
            3 => {
                let topic = create_topic(&mut rng);

                msgbus::publish(topic.as_str().into(), &"payload".to_owned());

                let actual_matches = msgbus.borrow_mut().matching_subscriptions(topic.as_str().into());
                let expected_matches = model.matching_subscriptions(&topic);

                assert_eq!(
                    expected_matches.len(),
                    actual_matches.len(),
                    "Op {op_num}: match count mismatch for topic '{topic}'"
                );
                for sub in &actual_matches {
                    assert!(
                        expected_matches
                            .contains(&(sub.pattern.to_string(), sub.handler_id.to_string())),
                        "Op {}: expected match not found: pattern='{}', handler_id='{}'",
                        op_num,
                        sub.pattern,
                        sub.handler_id
                    );
                }
            }
            _ => unreachable!(),
        }

        if op_num % 256 == 0 {
            check_cache_coherent(&msgbus.borrow());
        }
    }

    check_cache_coherent(&msgbus.borrow());
}
