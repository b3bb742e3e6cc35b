//! WebSocket protocol message definitions
//! These are the wire types between the product page and the server

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::view::{Membership, Notification, ViewState};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Mount the product page (replaces any page already open)
    OpenProduct {
        product_id: String,
        /// Rows per page, server default when absent
        #[serde(default)]
        page_size: Option<usize>,
    },

    /// Show the next page of stores
    NextPage,

    /// Show the previous page of stores
    PreviousPage,

    /// Add to or remove from the wishlist
    ToggleWishlist,

    /// Leave the product page
    CloseProduct,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { user_id: Uuid, server_time: u64 },

    /// Full state of the open product page
    View {
        #[serde(flatten)]
        state: Box<ViewState>,
    },

    /// Result of a wishlist toggle
    Wishlist { product_id: String, state: Membership },

    /// Product page closed
    Closed { product_id: String },

    /// Dismissible message for the user
    Notification(Notification),

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}
