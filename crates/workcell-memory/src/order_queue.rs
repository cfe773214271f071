//! Append-only order store.
//!
//! Orders are never dequeued: the cell works on the oldest order and keeps
//! re-reading it every tick.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use workcell_types::Order;

/// Shared, insertion-ordered sequence of received orders.
#[derive(Clone, Debug, Default)]
pub struct OrderQueue {
    orders: Arc<Mutex<Vec<Order>>>,
}

impl OrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `order` behind every order received so far.
    pub fn enqueue(&self, order: Order) {
        let mut orders = self.orders.lock();
        info!(order_id = %order.order_id, position = orders.len(), "order queued");
        orders.push(order);
    }

    /// The first order ever received, without removing it.
    pub fn peek_oldest(&self) -> Option<Order> {
        self.orders.lock().first().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }
}
