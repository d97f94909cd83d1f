//! Tab bridge - the message channel to the browser extension.
//!
//! The extension is a separate process and trust boundary: it may be absent,
//! slow, or send malformed messages, and none of that may disturb session
//! state. Tab data that cannot be fetched is simply missing from the next
//! snapshot.

mod cdp;
mod channel;
mod protocol;

pub use cdp::fetch_tabs;
pub use channel::{spawn_bridge, BridgeCommand, BridgeEvent, BridgeHandle};
pub use protocol::{decode_frame, encode_frame, read_frame, write_frame, BridgeMessage, WireTab,
                   MAX_FRAME_LEN};
