use crate::{AppState, error::ApiError, producers};
use axum::{
    Router,
    extract::{Path, State},
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
    routing,
};
use sga_core::models::AuctionId;
use sga_core::ports::AuctionStore;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::{Stream, StreamExt as _, wrappers::WatchStream};

pub fn router<T: AuctionStore>() -> Router<AppState<T>> {
    Router::new()
        .route("/auctions", routing::get(stream_auctions))
        .route("/auctions/{auction_id}", routing::get(stream_auction))
}

fn snapshot_event(payload: Option<String>) -> Result<Event, Infallible> {
    Ok(match payload {
        Some(json) => Event::default().event("snapshot").data(json),
        // The channel's initial value before the first tick.
        None => Event::default().comment(""),
    })
}

/// All-auctions snapshots, roughly once per second.
async fn stream_auctions<T: AuctionStore>(
    State(state): State<AppState<T>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.hub.subscribe_all()).map(snapshot_event);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Single-auction snapshots, roughly twice per second, ending with one
/// final snapshot when the auction reaches a terminal state.
async fn stream_auction<T: AuctionStore>(
    State(state): State<AppState<T>>,
    Path(auction_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let auction_id: AuctionId = auction_id.parse().map_err(|_| ApiError::InvalidAuctionId)?;
    state
        .store
        .get_auction(auction_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::AuctionNotFound)?;

    let (receiver, guard) = producers::subscribe(&state, auction_id);
    let stream = GuardedStream {
        inner: WatchStream::new(receiver).map(snapshot_event),
        _guard: guard,
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// A stream that keeps the producer's subscriber count while the client is
/// connected; the guard drops with the stream on disconnect.
struct GuardedStream<S> {
    inner: S,
    _guard: producers::SubscriberGuard,
}

impl<S: Stream + Unpin> Stream for GuardedStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
