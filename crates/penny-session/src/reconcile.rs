//! Stream reconciliation: folding fragments into the in-flight message

use futures::StreamExt;
use penny_ai::{CompletionStream, StreamEvent};
use tokio::sync::broadcast;

use crate::events::SessionEvent;
use crate::history::HistoryStore;

/// Consume a fragment stream and fold each fragment into the
/// placeholder message at `target`, signalling the rendering
/// collaborator once per fragment.
///
/// Fragments are applied strictly in arrival order; each mutation is
/// broadcast before the next fragment is read. On a stream error the
/// partial content already written is retained and the error message is
/// returned for the caller to surface.
pub async fn reconcile(
    stream: &mut CompletionStream,
    history: &mut HistoryStore,
    target: usize,
    events: &broadcast::Sender<SessionEvent>,
) -> Result<(), String> {
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Delta { text } => {
                history.push_fragment(target, &text);
            }
            StreamEvent::Usage { total_tokens } => {
                let separated = history
                    .message(target)
                    .is_some_and(|m| !m.content.is_empty());
                let footer = if separated {
                    format!("\n\n{}", usage_footer(total_tokens))
                } else {
                    usage_footer(total_tokens)
                };
                history.push_fragment(target, &footer);
            }
            StreamEvent::Error { message } => return Err(message),
        }

        if let Some(message) = history.message(target) {
            let _ = events.send(SessionEvent::MessageUpdate {
                index: target,
                message: message.clone(),
            });
        }
    }

    Ok(())
}

/// Render the terminal metering fragment as a footer
fn usage_footer(total_tokens: u32) -> String {
    format!("Total {} Tokens", total_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use penny_ai::Message;

    fn scripted(events: Vec<StreamEvent>) -> CompletionStream {
        Box::pin(tokio_stream::iter(events))
    }

    fn turn_history() -> (HistoryStore, usize) {
        let mut history = HistoryStore::new();
        let target = history.append_turn(Message::user("Hi"));
        (history, target)
    }

    #[tokio::test]
    async fn test_fragments_fold_in_order() {
        let (mut history, target) = turn_history();
        let (tx, mut rx) = broadcast::channel(16);

        let mut stream = scripted(vec![
            StreamEvent::Delta { text: "Hel".into() },
            StreamEvent::Delta { text: "lo".into() },
            StreamEvent::Delta {
                text: " world".into(),
            },
        ]);
        reconcile(&mut stream, &mut history, target, &tx)
            .await
            .unwrap();

        assert_eq!(history.messages()[target].text(), "Hello world");

        // One mutation observed per fragment, in order
        let mut observed = Vec::new();
        while let Ok(SessionEvent::MessageUpdate { message, .. }) = rx.try_recv() {
            observed.push(message.text());
        }
        assert_eq!(observed, vec!["Hel", "Hello", "Hello world"]);
    }

    #[tokio::test]
    async fn test_usage_footer_is_distinct_segment() {
        let (mut history, target) = turn_history();
        let (tx, _rx) = broadcast::channel(16);

        let mut stream = scripted(vec![
            StreamEvent::Delta { text: "Hi!".into() },
            StreamEvent::Usage { total_tokens: 42 },
        ]);
        reconcile(&mut stream, &mut history, target, &tx)
            .await
            .unwrap();

        assert_eq!(history.messages()[target].text(), "Hi!\n\nTotal 42 Tokens");
    }

    #[tokio::test]
    async fn test_usage_without_prose_has_no_separator() {
        let (mut history, target) = turn_history();
        let (tx, _rx) = broadcast::channel(16);

        let mut stream = scripted(vec![StreamEvent::Usage { total_tokens: 3 }]);
        reconcile(&mut stream, &mut history, target, &tx)
            .await
            .unwrap();

        assert_eq!(history.messages()[target].text(), "Total 3 Tokens");
    }

    #[tokio::test]
    async fn test_error_retains_partial_content() {
        let (mut history, target) = turn_history();
        let (tx, _rx) = broadcast::channel(16);

        let mut stream = scripted(vec![
            StreamEvent::Delta { text: "par".into() },
            StreamEvent::Error {
                message: "connection reset".into(),
            },
        ]);
        let err = reconcile(&mut stream, &mut history, target, &tx)
            .await
            .unwrap_err();

        assert_eq!(err, "connection reset");
        assert_eq!(history.messages()[target].text(), "par");
    }
}
