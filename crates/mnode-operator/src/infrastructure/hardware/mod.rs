//! Hardware wallet adapters.
//!
//! Vendor transports are outside this crate; they plug in by implementing
//! [`HardwareWallet`](crate::application::hardware::HardwareWallet).  What
//! lives here is device-independent:
//!
//! - **`prompt`** – [`ChannelPrompt`](prompt::ChannelPrompt), which relays
//!   PIN and passphrase questions from the device task to the front end.
//! - **`mock`** – [`SeededWallet`](mock::SeededWallet), a deterministic
//!   software wallet with real signatures for tests and dry runs.

pub mod mock;
pub mod prompt;
