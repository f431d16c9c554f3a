use bytes::Bytes;
use parley_core::{StreamConsumer, StreamState};
use parley_types::frame::encode;
use parley_types::{ChatTurn, Conversation, StreamEvent};
use proptest::prelude::*;
use std::convert::Infallible;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn consume(chunks: Vec<Vec<u8>>) -> (StreamState, Conversation) {
    let mut conversation = Conversation::from_turns(vec![ChatTurn::user("q")]);
    conversation.begin_assistant_turn();
    let body = futures_util::stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok::<_, Infallible>(Bytes::from(c))),
    );
    let state = runtime().block_on(async {
        StreamConsumer::new()
            .consume(body, &mut conversation, |_| {})
            .await
    });
    (state, conversation)
}

fn token_strategy() -> impl Strategy<Value = StreamEvent> {
    "(?s)[a-z\u{00e9}\u{4e16}\u{1F600} \n]{1,10}".prop_map(|text| StreamEvent::Token { text })
}

fn stream_strategy() -> impl Strategy<Value = Vec<StreamEvent>> {
    let terminal = prop_oneof![
        Just(None),
        Just(Some(StreamEvent::Done)),
        "[a-z ]{1,16}".prop_map(|short| Some(StreamEvent::Error {
            message: format!("ProviderError: {short}"),
            short_message: short,
        })),
    ];
    (proptest::collection::vec(token_strategy(), 0..10), terminal).prop_map(
        |(mut events, terminal)| {
            events.extend(terminal);
            events
        },
    )
}

fn split(bytes: &[u8], mut cuts: Vec<usize>) -> Vec<Vec<u8>> {
    cuts.retain(|&c| c > 0 && c < bytes.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(bytes[start..cut].to_vec());
        start = cut;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

proptest! {
    /// However the body is fragmented, the reader ends in the same state
    /// with the same conversation.
    #[test]
    fn fragmentation_does_not_change_outcome(
        events in stream_strategy(),
        cuts in proptest::collection::vec(0usize..2048, 0..16),
    ) {
        let bytes: Vec<u8> = events.iter().map(encode).collect::<String>().into_bytes();

        let whole = consume(vec![bytes.clone()]);
        let fragmented = consume(split(&bytes, cuts));
        prop_assert_eq!(&whole, &fragmented);

        let expected_state = match events.last() {
            Some(StreamEvent::Done) => StreamState::Completed,
            Some(StreamEvent::Error { .. }) => StreamState::Failed,
            _ => StreamState::Interrupted,
        };
        prop_assert_eq!(whole.0, expected_state);
    }

    /// Token text is reassembled exactly, one byte per chunk included.
    #[test]
    fn byte_at_a_time_reassembles_tokens(
        tokens in proptest::collection::vec(token_strategy(), 1..6),
    ) {
        let mut events = tokens.clone();
        events.push(StreamEvent::Done);
        let bytes: Vec<u8> = events.iter().map(encode).collect::<String>().into_bytes();

        let expected: String = tokens
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        let (state, conversation) = consume(bytes.iter().map(|b| vec![*b]).collect());
        prop_assert_eq!(state, StreamState::Completed);
        prop_assert_eq!(&conversation.last().unwrap().content, &expected);
    }
}
