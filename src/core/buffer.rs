use std::collections::VecDeque;

use tokio::sync::broadcast;

/// Default retention cap for a session's raw terminal output.
pub const DEFAULT_BUFFER_CAP: usize = 256 * 1024;

/// Capacity of the live-forwarding broadcast channel, in chunks.
const LIVE_CHANNEL_CAPACITY: usize = 1024;

/// Bridge attachment state for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    /// No backing process and no live stream.
    Unattached,
    /// Spawn requested, waiting on the bridge.
    Attaching,
    /// Process alive; output flows and input is accepted.
    Attached,
    /// Process exited; the retained buffer is read-only history.
    Ended,
}

/// Bounded ring over raw output bytes. Oldest bytes are dropped first, so
/// a remounted terminal widget replays at most `cap` bytes of history.
#[derive(Debug)]
pub struct TerminalBuffer {
    cap: usize,
    data: VecDeque<u8>,
}

impl TerminalBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            data: VecDeque::new(),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if bytes.len() >= self.cap {
            // Chunk alone exceeds the cap; keep only its tail.
            self.data.clear();
            self.data.extend(&bytes[bytes.len() - self.cap..]);
            return;
        }
        let overflow = (self.data.len() + bytes.len()).saturating_sub(self.cap);
        if overflow > 0 {
            self.data.drain(..overflow);
        }
        self.data.extend(bytes);
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Per-session terminal state held by the store: the retained ring buffer,
/// the live broadcast used to forward chunks to attached viewers, and the
/// attachment state machine.
pub struct TerminalAttachment {
    pub state: AttachState,
    buffer: TerminalBuffer,
    live_tx: broadcast::Sender<Vec<u8>>,
}

/// What a viewer gets back from `attach`: the buffered history to replay
/// into a fresh terminal widget, then the live stream to keep following.
#[derive(Debug)]
pub struct AttachHandle {
    pub replay: Vec<u8>,
    pub live: broadcast::Receiver<Vec<u8>>,
}

impl TerminalAttachment {
    pub fn new(cap: usize) -> Self {
        let (live_tx, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            state: AttachState::Unattached,
            buffer: TerminalBuffer::new(cap),
            live_tx,
        }
    }

    /// Seed the buffer with output restored from a persisted session.
    pub fn with_history(cap: usize, history: &[u8]) -> Self {
        let mut attachment = Self::new(cap);
        attachment.buffer.push(history);
        attachment.state = AttachState::Ended;
        attachment
    }

    /// Record a chunk and forward it to any live subscribers. Chunks are
    /// applied in the order the bridge produced them for this session.
    pub fn record(&mut self, bytes: &[u8]) {
        self.buffer.push(bytes);
        // No subscribers is fine; the buffer still retains the history.
        let _ = self.live_tx.send(bytes.to_vec());
    }

    pub fn subscribe(&self) -> AttachHandle {
        AttachHandle {
            replay: self.buffer.contents(),
            live: self.live_tx.subscribe(),
        }
    }

    /// Drop every live subscriber by swapping in a fresh channel. The
    /// retained buffer is untouched, so a later `subscribe` still replays
    /// the full history.
    pub fn disconnect(&mut self) {
        let (live_tx, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        self.live_tx = live_tx;
    }

    pub fn history(&self) -> Vec<u8> {
        self.buffer.contents()
    }

    pub fn has_history(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn accepts_input(&self) -> bool {
        self.state == AttachState::Attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_bytes_first() {
        let mut buffer = TerminalBuffer::new(8);
        buffer.push(b"abcdef");
        buffer.push(b"ghij");
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.contents(), b"cdefghij");
    }

    #[test]
    fn oversized_chunk_keeps_only_its_tail() {
        let mut buffer = TerminalBuffer::new(4);
        buffer.push(b"0123456789");
        assert_eq!(buffer.contents(), b"6789");
    }

    #[test]
    fn record_retains_history_without_subscribers() {
        let mut attachment = TerminalAttachment::new(64);
        attachment.record(b"hello ");
        attachment.record(b"world");
        assert_eq!(attachment.history(), b"hello world");
    }

    #[tokio::test]
    async fn subscriber_gets_replay_then_live_chunks() {
        let mut attachment = TerminalAttachment::new(64);
        attachment.record(b"earlier output\n");

        let mut handle = attachment.subscribe();
        assert_eq!(handle.replay, b"earlier output\n");

        attachment.record(b"new chunk");
        let chunk = handle.live.recv().await.unwrap();
        assert_eq!(chunk, b"new chunk");
    }

    #[tokio::test]
    async fn disconnect_drops_subscribers_but_keeps_history() {
        let mut attachment = TerminalAttachment::new(64);
        attachment.record(b"before");
        let mut handle = attachment.subscribe();

        attachment.disconnect();
        attachment.record(b"after");

        assert!(matches!(
            handle.live.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(attachment.history(), b"beforeafter");
        assert_eq!(attachment.subscribe().replay, b"beforeafter");
    }

    #[test]
    fn input_only_accepted_while_attached() {
        let mut attachment = TerminalAttachment::new(16);
        assert!(!attachment.accepts_input());
        attachment.state = AttachState::Attached;
        assert!(attachment.accepts_input());
        attachment.state = AttachState::Ended;
        assert!(!attachment.accepts_input());
    }
}
