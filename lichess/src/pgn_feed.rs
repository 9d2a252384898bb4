//! Streaming consumer of a round's never-ending PGN feed.
//!
//! The stream concatenates PGN games separated by `"\n\n\n"` (two blank
//! lines after the headers plus one after the movetext). Each complete
//! record that matches the header filters is delivered on the output
//! channel; once the followed game's `Result` header leaves `"*"` the
//! channel is closed and the feed returns. Transport errors reset the
//! buffer and reconnect after a short pause.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use chess::PgnGame;

use crate::catalog::CatalogError;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const RECORD_SEPARATOR: &str = "\n\n\n";

pub struct PgnFeed;

enum FeedOutcome {
    /// The followed game finished; normal completion.
    Finished,
    /// Nobody is listening anymore.
    ReceiverGone,
    /// The HTTP response ended without a finished game.
    Disconnected,
}

impl PgnFeed {
    /// Stream `url` until the game matched by `filters` ends. Each call
    /// opens its own HTTP session; the feed is finite iff the underlying
    /// game completes.
    pub async fn run(url: String, filters: Vec<(String, String)>, tx: mpsc::Sender<PgnGame>) {
        let client = reqwest::Client::new();
        loop {
            match Self::fetch(&client, &url, &filters, &tx).await {
                Ok(FeedOutcome::Finished) => {
                    tracing::info!(%url, "Game finished, closing PGN feed");
                    return;
                }
                Ok(FeedOutcome::ReceiverGone) => {
                    tracing::debug!(%url, "PGN feed consumer went away");
                    return;
                }
                Ok(FeedOutcome::Disconnected) => {
                    tracing::warn!(%url, "PGN stream closed, reconnecting");
                }
                Err(e) => {
                    tracing::warn!(%url, error = %e, "PGN stream error, reconnecting");
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn fetch(
        client: &reqwest::Client,
        url: &str,
        filters: &[(String, String)],
        tx: &mpsc::Sender<PgnGame>,
    ) -> Result<FeedOutcome, CatalogError> {
        let response = client.get(url).send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();
        let mut buffer = FeedBuffer::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for record in buffer.push(&String::from_utf8_lossy(&chunk)) {
                match Self::deliver(&record, filters, tx).await {
                    Delivery::Continue => {}
                    Delivery::Finished => return Ok(FeedOutcome::Finished),
                    Delivery::ReceiverGone => return Ok(FeedOutcome::ReceiverGone),
                }
            }
        }
        Ok(FeedOutcome::Disconnected)
    }

    async fn deliver(
        record: &str,
        filters: &[(String, String)],
        tx: &mpsc::Sender<PgnGame>,
    ) -> Delivery {
        let game = match chess::parse_game(record) {
            Ok(game) => game,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparseable PGN record");
                return Delivery::Continue;
            }
        };
        if !matches_filters(&game, filters) {
            return Delivery::Continue;
        }
        tracing::debug!(
            event = game.tag("Event").unwrap_or("?"),
            plies = game.moves.len(),
            "Matched PGN update"
        );
        let finished = !game.is_ongoing();
        if tx.send(game).await.is_err() {
            return Delivery::ReceiverGone;
        }
        if finished {
            Delivery::Finished
        } else {
            Delivery::Continue
        }
    }
}

enum Delivery {
    Continue,
    Finished,
    ReceiverGone,
}

/// A subscriber matches a PGN record iff every filter key is present with
/// exactly the filter's value.
fn matches_filters(game: &PgnGame, filters: &[(String, String)]) -> bool {
    filters
        .iter()
        .all(|(key, value)| game.tag(key) == Some(value.as_str()))
}

/// Accumulates stream chunks and yields complete `"\n\n\n"`-delimited
/// records.
struct FeedBuffer {
    buf: String,
}

impl FeedBuffer {
    fn new() -> Self {
        Self { buf: String::new() }
    }

    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut records = Vec::new();
        while let Some(idx) = self.buf.find(RECORD_SEPARATOR) {
            let record = self.buf[..idx].to_string();
            self.buf.drain(..idx + RECORD_SEPARATOR.len());
            if !record.trim().is_empty() {
                records.push(record);
            }
        }
        records
    }
}
