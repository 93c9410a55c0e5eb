use std::sync::mpsc::{self, Receiver, Sender};

/// Notifications emitted by the scroller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollerEvent {
    /// The page under the reading line changed
    CurrentPageChanged(u32),

    /// A page failed to render and keeps its placeholder
    RenderFailed { page_index: u32, reason: String },
}

/// Fan-out of scroller events to any number of receivers
///
/// Receivers that were dropped are detached on the next emit.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Vec<Sender<ScrollerEvent>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<ScrollerEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    pub fn emit(&mut self, event: ScrollerEvent) {
        self.subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Drop every subscriber; their receivers see a disconnect
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
