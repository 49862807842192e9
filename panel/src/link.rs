//! Broker connection state shared by the MQTT receive loop and the HTTP/status side.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    Other,
}

#[derive(Debug, Default)]
pub struct MqttLink {
    connected: AtomicBool,
}

impl MqttLink {
    /// Records a transport event. Returns true when the status filter must be
    /// (re)subscribed, which is on every fresh broker session.
    pub fn observe(&self, event: LinkEvent) -> bool {
        match event {
            LinkEvent::Connected => {
                self.connected.store(true, Ordering::Relaxed);
                true
            }
            LinkEvent::Disconnected => {
                self.connected.store(false, Ordering::Relaxed);
                false
            }
            LinkEvent::Other => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
