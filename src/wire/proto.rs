//! Protobuf representation of the protocol messages.
//!
//! Declared with the prost derive macros instead of generated from `.proto`
//! files. Field tags are part of the wire format and of the commitment hash,
//! never renumber them.

/// Outer envelope exchanged between the two peers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    #[prost(bytes = "vec", tag = "1")]
    pub sender: Vec<u8>,
    #[prost(oneof = "envelope::Msg", tags = "2, 3")]
    pub msg: Option<envelope::Msg>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Msg {
        #[prost(message, tag = "2")]
        ChannelMsg(super::ChannelMsg),
        #[prost(message, tag = "3")]
        ErrorMsg(super::ErrorMsg),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelMsg {
    #[prost(message, optional, tag = "1")]
    pub update: Option<ChannelUpdate>,
    #[prost(message, optional, tag = "2")]
    pub latest_update: Option<ChannelUpdate>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelUpdate {
    #[prost(bytes = "vec", tag = "1")]
    pub channel_address: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub nonce: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub from_identifier: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub to_identifier: Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub details: Option<UpdateDetails>,
    /// One entry per participant, empty if that participant has not signed.
    #[prost(bytes = "vec", repeated, tag = "6")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateDetails {
    #[prost(oneof = "update_details::Details", tags = "1, 2, 3")]
    pub details: Option<update_details::Details>,
}

pub mod update_details {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Details {
        #[prost(message, tag = "1")]
        Setup(super::SetupDetails),
        #[prost(message, tag = "2")]
        Transfer(super::TransferDetails),
        #[prost(message, tag = "3")]
        Close(super::CloseDetails),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetupDetails {
    #[prost(uint64, tag = "1")]
    pub timeout: u64,
    /// Big-endian uint256, one entry per participant.
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub balances: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransferDetails {
    #[prost(bytes = "vec", tag = "1")]
    pub amount: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CloseDetails {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelState {
    #[prost(bytes = "vec", tag = "1")]
    pub channel_address: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub participants: Vec<Vec<u8>>,
    #[prost(uint64, tag = "3")]
    pub chain_id: u64,
    #[prost(uint64, tag = "4")]
    pub timeout: u64,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub balances: Vec<Vec<u8>>,
    #[prost(bool, tag = "6")]
    pub is_final: bool,
    #[prost(uint64, tag = "7")]
    pub latest_nonce: u64,
    #[prost(message, optional, tag = "8")]
    pub latest_update: Option<ChannelUpdate>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorMsg {
    #[prost(enumeration = "ErrorReason", tag = "1")]
    pub reason: i32,
    #[prost(message, optional, tag = "2")]
    pub update: Option<ChannelUpdate>,
    #[prost(message, optional, tag = "3")]
    pub state: Option<ChannelState>,
    #[prost(message, optional, tag = "4")]
    pub counterparty_latest_update: Option<ChannelUpdate>,
    #[prost(string, tag = "5")]
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorReason {
    Unspecified = 0,
    ChannelNotFound = 1,
    BadSignatures = 2,
    StaleUpdateNonce = 3,
    StaleChannelNonce = 4,
    StaleChannelNonceNoUpdate = 5,
    ApplyUpdateFailed = 6,
    SaveChannelFailed = 7,
    MessageFailed = 8,
}

/// Fields of [ChannelUpdate] covered by the participants' signatures.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateCommitment {
    #[prost(bytes = "vec", tag = "1")]
    pub channel_address: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub nonce: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub from_identifier: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub to_identifier: Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub details: Option<UpdateDetails>,
}

/// Preimage of a channel address.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelParams {
    #[prost(bytes = "vec", tag = "1")]
    pub initiator: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub responder: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub chain_id: u64,
}
