// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `list-orders` query surface (§6 Query surface): filter, sort,
//! paginate, and optionally include related rows. Unknown filter/sort/
//! include names are rejected with `invalid-query` rather than silently
//! ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use wocp_core::{ActorType, EngineError, Event, Item, ItemState, Order, OrderState};

use crate::state::MaterializedState;

const MAX_PAGE_SIZE: u32 = 100;
const MAX_EVENTS_PER_ORDER: usize = 200;

/// A numeric comparison filter, e.g. `priority: {"gte": 50}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumericFilter<T> {
    pub eq: Option<T>,
    pub gt: Option<T>,
    pub gte: Option<T>,
    pub lt: Option<T>,
    pub lte: Option<T>,
}

impl NumericFilter<i64> {
    fn matches(&self, value: i64) -> bool {
        self.eq.map_or(true, |v| value == v)
            && self.gt.map_or(true, |v| value > v)
            && self.gte.map_or(true, |v| value >= v)
            && self.lt.map_or(true, |v| value < v)
            && self.lte.map_or(true, |v| value <= v)
    }
}

impl NumericFilter<u64> {
    fn matches(&self, value: u64) -> bool {
        self.eq.map_or(true, |v| value == v)
            && self.gt.map_or(true, |v| value > v)
            && self.gte.map_or(true, |v| value >= v)
            && self.lt.map_or(true, |v| value < v)
            && self.lte.map_or(true, |v| value <= v)
    }
}

/// The typed form of every filter the spec names. Construct via
/// [`ListOrdersQuery::parse`] to get unknown-name rejection, or directly
/// when the caller already has a validated, typed filter.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub state: Option<Vec<OrderState>>,
    pub type_id: Option<String>,
    pub priority: Option<NumericFilter<i64>>,
    pub requested_by_type: Option<ActorType>,
    pub created_at: Option<NumericFilter<u64>>,
    /// Orders with at least one queued item whose lease is null or expired.
    pub has_available_items: Option<bool>,
    /// JSON-containment predicate on `meta`: every key/value here must be
    /// present (and equal) in the order's `meta` object.
    pub meta_contains: Option<Value>,
    pub items_state: Option<ItemState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Priority,
    CreatedAt,
    LastTransitionedAt,
    AppliedAt,
    CompletedAt,
    ItemsCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct ListOrdersQuery {
    pub filter: OrderFilter,
    /// Default ordering is `[(Priority, Desc), (CreatedAt, Asc)]`.
    pub sort: Vec<(SortField, SortOrder)>,
    pub page: u32,
    pub page_size: u32,
    pub include_items: bool,
    pub include_events: bool,
    pub include_items_count: bool,
}

impl Default for ListOrdersQuery {
    fn default() -> Self {
        Self {
            filter: OrderFilter::default(),
            sort: vec![(SortField::Priority, SortOrder::Desc), (SortField::CreatedAt, SortOrder::Asc)],
            page: 1,
            page_size: 20,
            include_items: true,
            include_events: false,
            include_items_count: false,
        }
    }
}

impl ListOrdersQuery {
    /// Parses a transport-supplied query from loosely-typed string keys,
    /// rejecting any filter/sort/include name not in §6's whitelist.
    pub fn parse(
        raw_filters: &HashMap<String, Value>,
        raw_sort: &[String],
        raw_include: &[String],
        page: u32,
        page_size: u32,
    ) -> Result<Self, EngineError> {
        let mut query = ListOrdersQuery { page: page.max(1), page_size: page_size.min(MAX_PAGE_SIZE).max(1), ..Default::default() };
        query.sort.clear();
        query.include_items = false;

        for (name, value) in raw_filters {
            match name.as_str() {
                "state" => {
                    let states: Vec<OrderState> = serde_json::from_value(value.clone())
                        .map_err(|e| EngineError::invalid_query(format!("invalid state filter: {e}")))?;
                    query.filter.state = Some(states);
                }
                "type" => {
                    query.filter.type_id = value.as_str().map(String::from);
                }
                "priority" => {
                    query.filter.priority = Some(
                        serde_json::from_value(value.clone())
                            .map_err(|e| EngineError::invalid_query(format!("invalid priority filter: {e}")))?,
                    );
                }
                "requested_by_type" => {
                    query.filter.requested_by_type = Some(
                        serde_json::from_value(value.clone()).map_err(|e| {
                            EngineError::invalid_query(format!("invalid requested_by_type filter: {e}"))
                        })?,
                    );
                }
                "created_at" => {
                    query.filter.created_at = Some(
                        serde_json::from_value(value.clone())
                            .map_err(|e| EngineError::invalid_query(format!("invalid created_at filter: {e}")))?,
                    );
                }
                "has_available_items" => {
                    query.filter.has_available_items = value.as_bool();
                }
                "meta" => {
                    query.filter.meta_contains = Some(value.clone());
                }
                "items.state" => {
                    query.filter.items_state = Some(
                        serde_json::from_value(value.clone())
                            .map_err(|e| EngineError::invalid_query(format!("invalid items.state filter: {e}")))?,
                    );
                }
                other => return Err(EngineError::invalid_query(format!("unknown filter: {other}"))),
            }
        }

        for name in raw_sort {
            let (field_name, order) = match name.strip_prefix('-') {
                Some(rest) => (rest, SortOrder::Desc),
                None => (name.as_str(), SortOrder::Asc),
            };
            let field = match field_name {
                "priority" => SortField::Priority,
                "created_at" => SortField::CreatedAt,
                "last_transitioned_at" => SortField::LastTransitionedAt,
                "applied_at" => SortField::AppliedAt,
                "completed_at" => SortField::CompletedAt,
                "items_count" => SortField::ItemsCount,
                other => return Err(EngineError::invalid_query(format!("unknown sort field: {other}"))),
            };
            query.sort.push((field, order));
        }
        if query.sort.is_empty() {
            query.sort = vec![(SortField::Priority, SortOrder::Desc), (SortField::CreatedAt, SortOrder::Asc)];
        }

        for name in raw_include {
            match name.as_str() {
                "items" => query.include_items = true,
                "events" => query.include_events = true,
                "items_count" => query.include_items_count = true,
                other => return Err(EngineError::invalid_query(format!("unknown include: {other}"))),
            }
        }

        Ok(query)
    }
}

/// One order row plus whatever the query asked to include.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub order: Order,
    pub items: Option<Vec<Item>>,
    pub events: Option<Vec<Event>>,
    pub items_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ListOrdersResult {
    pub orders: Vec<OrderView>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
}

fn has_available_item(state: &MaterializedState, order_id: &wocp_core::OrderId, now_ms: u64) -> bool {
    state.items_for_order(order_id).iter().any(|item| {
        item.state == ItemState::Queued && item.lease_expires_at_ms.map_or(true, |exp| now_ms >= exp)
    })
}

fn meta_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => {
            n.iter().all(|(k, v)| h.get(k).is_some_and(|hv| meta_contains(hv, v)))
        }
        _ => haystack == needle,
    }
}

fn matches(state: &MaterializedState, order: &Order, filter: &OrderFilter, now_ms: u64) -> bool {
    if let Some(states) = &filter.state {
        if !states.contains(&order.state) {
            return false;
        }
    }
    if let Some(type_id) = &filter.type_id {
        if &order.type_id != type_id {
            return false;
        }
    }
    if let Some(priority) = &filter.priority {
        if !priority.matches(order.priority) {
            return false;
        }
    }
    if let Some(actor_type) = &filter.requested_by_type {
        if order.requested_by.as_ref().map(|a| a.actor_type) != Some(*actor_type) {
            return false;
        }
    }
    if let Some(created_at) = &filter.created_at {
        if !created_at.matches(order.created_at_ms) {
            return false;
        }
    }
    if let Some(want) = filter.has_available_items {
        if has_available_item(state, &order.id, now_ms) != want {
            return false;
        }
    }
    if let Some(needle) = &filter.meta_contains {
        if !meta_contains(&order.meta, needle) {
            return false;
        }
    }
    if let Some(item_state) = &filter.items_state {
        if !state.items_for_order(&order.id).iter().any(|i| &i.state == item_state) {
            return false;
        }
    }
    true
}

fn sort_key(state: &MaterializedState, order: &Order, field: SortField) -> i128 {
    match field {
        SortField::Priority => order.priority as i128,
        SortField::CreatedAt => order.created_at_ms as i128,
        SortField::LastTransitionedAt => order.last_transitioned_at_ms as i128,
        SortField::AppliedAt => order.applied_at_ms.unwrap_or_default() as i128,
        SortField::CompletedAt => order.completed_at_ms.unwrap_or_default() as i128,
        SortField::ItemsCount => state.items_for_order(&order.id).len() as i128,
    }
}

/// Executes a query against `state`. `now_ms` drives the
/// `has_available_items` predicate's lease-expiry check.
pub fn run(
    state: &MaterializedState,
    query: &ListOrdersQuery,
    now_ms: u64,
) -> Result<ListOrdersResult, EngineError> {
    let mut matched: Vec<&Order> =
        state.orders.values().filter(|order| matches(state, order, &query.filter, now_ms)).collect();

    matched.sort_by(|a, b| {
        for (field, order) in &query.sort {
            let (ka, kb) = (sort_key(state, a, *field), sort_key(state, b, *field));
            let ord = match order {
                SortOrder::Asc => ka.cmp(&kb),
                SortOrder::Desc => kb.cmp(&ka),
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        a.id.as_str().cmp(b.id.as_str())
    });

    let total = matched.len();
    let start = ((query.page.saturating_sub(1)) as usize) * (query.page_size as usize);
    let page_slice: Vec<&Order> = matched.into_iter().skip(start).take(query.page_size as usize).collect();

    let orders = page_slice
        .into_iter()
        .map(|order| {
            let items = query.include_items.then(|| {
                let mut items: Vec<Item> = state.items_for_order(&order.id).into_iter().cloned().collect();
                items.sort_by_key(|i| i.created_at_ms);
                items
            });
            let events = query.include_events.then(|| {
                state
                    .events_for_order(&order.id)
                    .into_iter()
                    .rev()
                    .take(MAX_EVENTS_PER_ORDER)
                    .rev()
                    .cloned()
                    .collect()
            });
            let items_count = query.include_items_count.then(|| state.items_for_order(&order.id).len());
            OrderView { order: order.clone(), items, events, items_count }
        })
        .collect();

    Ok(ListOrdersResult { orders, total, page: query.page, page_size: query.page_size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wocp_core::OrderBuilder;

    #[test]
    fn unknown_filter_name_is_rejected() {
        let mut filters = HashMap::new();
        filters.insert("bogus".to_string(), Value::Bool(true));
        let err = ListOrdersQuery::parse(&filters, &[], &[], 1, 20).unwrap_err();
        assert_eq!(err.kind.code(), "invalid-query");
    }

    #[test]
    fn page_size_is_capped_at_100() {
        let query = ListOrdersQuery::parse(&HashMap::new(), &[], &[], 1, 500).unwrap();
        assert_eq!(query.page_size, 100);
    }

    #[test]
    fn default_order_is_priority_desc_then_created_at_asc() {
        let mut state = MaterializedState::new();
        let low = OrderBuilder::default().priority(1i64).created_at_ms(1u64).build();
        let high = OrderBuilder::default().priority(10i64).created_at_ms(2u64).build();
        state.orders.insert(low.id, low.clone());
        state.orders.insert(high.id, high.clone());

        let query = ListOrdersQuery::default();
        let result = run(&state, &query, 0).unwrap();
        assert_eq!(result.orders[0].order.id, high.id);
        assert_eq!(result.orders[1].order.id, low.id);
    }
}
