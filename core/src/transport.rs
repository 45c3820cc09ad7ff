/// Wire transport to the storage relays, consumed as an opaque capability
use crate::error::Result;
use crate::message::{
    Namespace, OpenGroupReceipt, OpenGroupRoom, OutgoingMessage, Reaction, SendReceipt,
};
use async_trait::async_trait;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Store `message` for `destination` under `namespace`
    async fn send(
        &self,
        destination: &str,
        message: &OutgoingMessage,
        namespace: Namespace,
    ) -> Result<SendReceipt>;

    /// Post to an open group room, optionally with a blinded sender id
    async fn send_open_group(
        &self,
        room: &OpenGroupRoom,
        payload: &[u8],
        blinded: bool,
    ) -> Result<OpenGroupReceipt>;

    /// Reaction endpoint of an open group room
    async fn send_open_group_reaction(
        &self,
        room: &OpenGroupRoom,
        reaction: &Reaction,
    ) -> Result<OpenGroupReceipt>;

    /// Message request to a blinded id through the room's server inbox
    async fn send_blinded_request(
        &self,
        room: &OpenGroupRoom,
        recipient_blinded_id: &str,
        payload: &[u8],
    ) -> Result<OpenGroupReceipt>;

    /// Ask the relay to drop messages that a newer push superseded
    async fn delete_messages(&self, _owner: &str, _hashes: &[String]) -> Result<()> {
        Ok(())
    }
}
