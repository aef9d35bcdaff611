//! Key and channel layout of the coordination store
//!
//! Cache sets carry a bounded TTL and are rebuilt from the registry when they
//! expire; pending/ownership/heartbeat/price keys do not expire.

use crate::models::{EntityClass, NodeId};

/// Set of `token::id` entries for known underlyings
pub const UNDERLYING_CACHE: &str = "instruments:underlying";

/// Hash of `node_id -> last_ping_epoch_seconds`
pub const HEARTBEAT_HASH: &str = "feed:heartbeat";

/// Hash of `instrument_token -> last_price`
pub const PRICE_HASH: &str = "feed:price";

/// Channel announcing freshly synced instruments; payload is the entity class
pub const NEW_INSTRUMENTS_CHANNEL: &str = "instruments.new";

/// Channel carrying targeted reconnect requests; payload is the node id
pub const RECONNECT_CHANNEL: &str = "feed.reconnect";

/// Set of `token::id` entries for the derivatives of one underlying
pub fn derivative_cache(parent_token: &str) -> String {
    format!("instruments:derivative:{parent_token}")
}

/// Set of tokens awaiting subscription assignment for an entity class
pub fn pending_batch(class: EntityClass) -> String {
    format!("pending:{class}")
}

/// Set of tokens a node has successfully subscribed to
pub fn ownership(node: &NodeId) -> String {
    format!("owned:{node}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_embed_their_scope() {
        assert_eq!(derivative_cache("NIFTY-TOK"), "instruments:derivative:NIFTY-TOK");
        assert_eq!(pending_batch(EntityClass::Underlying), "pending:underlying");
        assert_eq!(pending_batch(EntityClass::Derivative), "pending:derivative");
        let node = NodeId::from_string("node-1");
        assert_eq!(ownership(&node), "owned:node-1");
    }
}
