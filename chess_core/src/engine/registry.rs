//! Single-use listeners that pair engine replies with the requests that
//! provoked them.

use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    UciOk,
    ReadyOk,
    BestMove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    UciOk,
    ReadyOk,
    BestMove(Option<String>),
}

impl Reply {
    #[must_use]
    pub const fn kind(&self) -> Expect {
        match self {
            Self::UciOk => Expect::UciOk,
            Self::ReadyOk => Expect::ReadyOk,
            Self::BestMove(_) => Expect::BestMove,
        }
    }
}

pub type ListenerId = u64;

#[derive(Debug)]
struct Listener {
    id: ListenerId,
    expect: Expect,
    tx: oneshot::Sender<Reply>,
}

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: ListenerId,
    listeners: Vec<Listener>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, expect: Expect) -> (ListenerId, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push(Listener { id, expect, tx });
        (id, rx)
    }

    /// Hands `reply` to the oldest live listener waiting for its kind.
    /// Returns false when nobody was waiting.
    pub fn dispatch(&mut self, reply: Reply) -> bool {
        self.listeners.retain(|l| !l.tx.is_closed());
        let kind = reply.kind();
        let Some(index) = self.listeners.iter().position(|l| l.expect == kind) else {
            return false;
        };
        let listener = self.listeners.remove(index);
        listener.tx.send(reply).is_ok()
    }

    pub fn cancel(&mut self, id: ListenerId) {
        self.listeners.retain(|l| l.id != id);
    }

    /// Drops every listener; their receivers observe a closed channel.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
