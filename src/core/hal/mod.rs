//! Hardware collaborators behind traits so the whole stack runs against
//! in-memory fakes in tests.

pub mod power;
pub mod nvm;
pub mod radio_link;

pub use power::{GpioPowerControl, MockPowerControl, PowerControl};
pub use nvm::{FileNvmStore, MemoryNvmStore, NvmStore};
pub use radio_link::{
    MockRadioLink, ModemRadioLink, RadioLink, DOWNLINK_FRAME_LEN, MAX_UPLINK_PAYLOAD,
};
