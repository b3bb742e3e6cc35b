//! WebSocket upgrade handler and product page session

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::config::Config;
use crate::http::auth::verify_jwt;
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::view::{Membership, Notification, ProductView, ViewError, ViewEvent};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

type WsSink = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match verify_jwt(&query.token, &state.config.supabase_jwt_secret) {
        Ok(claims) => {
            info!(user_id = %claims.sub, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, state))
        }
        Err(e) => {
            error!(error = %e, "WebSocket auth failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(user_id = %user_id, session_id = %session_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        user_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(user_id = %user_id, error = %e, "Failed to send welcome");
        return;
    }

    let mut session = Session {
        user_id,
        session_id,
        state,
        view: None,
        sink: ws_sink,
    };
    session.run(ws_stream).await;
    session.close_view();

    info!(user_id = %user_id, session_id = %session_id, "WebSocket connection closed");
}

/// One connection: at most one mounted product view, driven from a single
/// task so navigation, toggles and feed deliveries never interleave
struct Session {
    user_id: Uuid,
    session_id: Uuid,
    state: AppState,
    view: Option<ProductView>,
    sink: WsSink,
}

impl Session {
    async fn run(&mut self, mut ws_stream: futures::stream::SplitStream<WebSocket>) {
        let rate_limiter = SessionRateLimiter::new();

        loop {
            tokio::select! {
                incoming = ws_stream.next() => {
                    let Some(result) = incoming else { break };
                    match result {
                        Ok(Message::Text(text)) => {
                            if !rate_limiter.check_message() {
                                warn!(user_id = %self.user_id, "Rate limited client message");
                                continue;
                            }
                            match serde_json::from_str::<ClientMsg>(&text) {
                                Ok(msg) => {
                                    if self.on_client_msg(msg).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    warn!(user_id = %self.user_id, error = %e, "Failed to parse client message");
                                    let reply = ServerMsg::Error {
                                        code: "bad_message".into(),
                                        message: e.to_string(),
                                    };
                                    if self.send(&reply).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Ok(Message::Binary(_)) => {
                            warn!(user_id = %self.user_id, "Received binary message, ignoring");
                        }
                        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                        Ok(Message::Close(_)) => {
                            info!(user_id = %self.user_id, "Client initiated close");
                            break;
                        }
                        Err(e) => {
                            error!(user_id = %self.user_id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }
                event = next_view_event(&mut self.view) => {
                    if self.on_view_event(event).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn on_client_msg(&mut self, msg: ClientMsg) -> Result<(), String> {
        match msg {
            ClientMsg::OpenProduct {
                product_id,
                page_size,
            } => self.open_view(&product_id, page_size).await,
            ClientMsg::NextPage => self.navigate(ProductView::page_forward).await,
            ClientMsg::PreviousPage => self.navigate(ProductView::page_backward).await,
            ClientMsg::ToggleWishlist => self.toggle_wishlist().await,
            ClientMsg::CloseProduct => {
                if let Some(product_id) = self.close_view() {
                    self.send(&ServerMsg::Closed { product_id }).await?;
                }
                Ok(())
            }
            ClientMsg::Ping { t } => self.send(&ServerMsg::Pong { t }).await,
        }
    }

    async fn open_view(&mut self, product_id: &str, page_size: Option<usize>) -> Result<(), String> {
        self.close_view();

        let page_size = effective_page_size(page_size, &self.state.config);
        let mounted = ProductView::mount(
            self.state.store.clone(),
            self.user_id,
            product_id,
            page_size,
        )
        .await;

        let mut view = match mounted {
            Ok(view) => view,
            Err(e) => {
                warn!(user_id = %self.user_id, product_id = %product_id, error = %e, "Failed to mount product view");
                return self.report(&e).await;
            }
        };

        let reconciled = view.reconcile_wishlist().await;
        self.state.views.open(self.session_id, product_id);
        self.view = Some(view);

        if let Err(e) = reconciled {
            self.report(&e).await?;
        }
        self.send_view().await
    }

    fn close_view(&mut self) -> Option<String> {
        let mut view = self.view.take()?;
        view.teardown();
        self.state.views.close(&self.session_id);
        Some(view.product_id().to_string())
    }

    async fn navigate(
        &mut self,
        step: fn(&mut ProductView) -> Result<(), ViewError>,
    ) -> Result<(), String> {
        let Some(view) = self.view.as_mut() else {
            return Ok(());
        };
        match step(view) {
            // Disabled controls make this a client bug; the view already logged it
            Err(ViewError::NavigationBounds { .. }) | Err(ViewError::NavigationInFlight) => Ok(()),
            Err(e) => self.report(&e).await,
            Ok(()) => self.send_view().await,
        }
    }

    async fn toggle_wishlist(&mut self) -> Result<(), String> {
        let Some(view) = self.view.as_mut() else {
            return Ok(());
        };
        let product_id = view.product_id().to_string();
        match view.toggle_wishlist().await {
            Ok(state) => {
                let message = match state {
                    Membership::Member => "Added to wishlist successfully!",
                    Membership::NotMember => "Removed from wishlist successfully!",
                };
                self.send(&ServerMsg::Wishlist { product_id, state }).await?;
                self.send(&ServerMsg::Notification(Notification::success(message)))
                    .await
            }
            Err(e) => self.report(&e).await,
        }
    }

    async fn on_view_event(&mut self, event: ViewEvent) -> Result<(), String> {
        let Some(view) = self.view.as_mut() else {
            return Ok(());
        };
        match view.handle(event) {
            Ok(true) => self.send_view().await,
            Ok(false) => Ok(()),
            Err(e) => {
                self.report(&e).await?;
                self.send_view().await
            }
        }
    }

    async fn send_view(&mut self) -> Result<(), String> {
        let Some(view) = self.view.as_ref() else {
            return Ok(());
        };
        let msg = ServerMsg::View {
            state: Box::new(view.state()),
        };
        self.send(&msg).await
    }

    /// Surface an error as a notification when the user should see it
    async fn report(&mut self, e: &ViewError) -> Result<(), String> {
        match e.notification() {
            Some(notification) => self.send(&ServerMsg::Notification(notification)).await,
            None => {
                debug!(user_id = %self.user_id, error = %e, "Error not surfaced to client");
                Ok(())
            }
        }
    }

    async fn send(&mut self, msg: &ServerMsg) -> Result<(), String> {
        send_msg(&mut self.sink, msg).await
    }
}

/// Requested rows per page, defaulted and clamped to `[1, max_page_size]`
fn effective_page_size(requested: Option<usize>, config: &Config) -> usize {
    requested
        .unwrap_or(config.page_size)
        .clamp(1, config.max_page_size)
}

/// Next delivery of the mounted view; never resolves without one
async fn next_view_event(view: &mut Option<ProductView>) -> ViewEvent {
    match view {
        Some(view) => view.next_event().await,
        None => std::future::pending().await,
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
