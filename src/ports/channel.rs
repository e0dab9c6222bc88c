//! Channel I/O port.
//!
//! The sentinel protocol only needs three operations on a shell
//! channel: write bytes, read the next output chunk, and interrupt.
//! Keeping them behind a trait lets the runner (including its watchdog)
//! be tested against a scripted in-memory channel.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait ChannelIo: Send {
    /// Writes raw bytes to the remote shell's stdin.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Next chunk of remote output (stdout and stderr interleaved, as
    /// the shell channel delivers them). `None` means the channel is
    /// closed and no more data will arrive.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Best-effort interrupt: signal the remote process and close the
    /// channel. Used by the watchdog on timeout.
    async fn interrupt(&mut self);
}
