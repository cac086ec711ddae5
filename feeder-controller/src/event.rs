/// Everything the controller reacts to, from the broker connection and the
/// motion sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The broker accepted the connection (first connect or reconnect).
    Connected,
    /// The broker connection was lost.
    Disconnected,
    /// An inbound publish on any subscribed topic.
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Rising edge on the motion sensor input.
    MotionDetected,
}
