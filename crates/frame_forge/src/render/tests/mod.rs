//! Cross-module scenarios driven through the headless device

mod frame_sync;
