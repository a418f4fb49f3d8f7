//! Session events and actions.
//!
//! The caller (transport/UI layer) feeds [`SessionEvent`]s into the
//! session and executes the [`SessionAction`]s it returns. The session
//! itself never touches the network.

use seclave_crypto::{Fingerprint, PublicKeyRecord, RoomCode};

use crate::{
    membership::Member,
    wire::{MembershipUpdate, WireJoinRequest, WireMessage},
};

/// Events the caller feeds into the session.
///
/// The caller is responsible for:
/// - Receiving wire structures from the relay and decoding them
/// - Forwarding application intents (create, join, send, approve, ...)
/// - Delivering every membership update before any message encrypted
///   after that update (key-then-message ordering, see crate docs)
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The relay confirmed room creation with this code; the caller
    /// becomes owner and sole member.
    CreateRoom {
        /// Server-assigned room code.
        room_code: String,
    },

    /// Application wants to join an existing room.
    RequestJoin {
        /// Code of the room to join.
        room_code: String,
    },

    /// A join request arrived (owner side).
    JoinRequestReceived(WireJoinRequest),

    /// Owner approves a pending join request.
    ApproveJoin {
        /// Id of the pending request.
        request_id: u64,
    },

    /// Owner denies a pending join request.
    DenyJoin {
        /// Id of the pending request.
        request_id: u64,
    },

    /// Our join request was approved (joiner side). Carries the full
    /// published membership so we derive the room key independently.
    JoinApproved {
        /// Room we were admitted to.
        room_code: String,
        /// Every current member with their public key.
        members: Vec<Member>,
        /// Authoritative membership version.
        version: u64,
    },

    /// Our join request was denied (joiner side).
    JoinDenied,

    /// A membership snapshot arrived (any member). Stale versions are
    /// ignored with a log action.
    MembershipChanged(MembershipUpdate),

    /// A member left; the owner removes them and republishes (owner side).
    MemberLeft {
        /// Public key of the member who left.
        public_key: PublicKeyRecord,
    },

    /// Application wants to send a message to the room.
    SendMessage {
        /// Message plaintext.
        plaintext: String,
    },

    /// An encrypted message arrived from the relay.
    EnvelopeReceived(WireMessage),

    /// Application wants to leave the current room (member side), or
    /// abandon a pending join request.
    LeaveRoom,

    /// Owner closes the room for everyone. Terminal for the room; all
    /// room state is discarded.
    CloseRoom,

    /// The owner closed the room we were in (member side).
    RoomClosed,
}

/// Actions the session produces for the caller to execute.
#[derive(Debug, Clone)]
pub enum SessionAction {
    /// Submit our join request to the relay.
    SubmitJoinRequest(WireJoinRequest),

    /// Surface a pending join request to the owner, with the
    /// requester's key fingerprint for out-of-band verification.
    NotifyJoinRequest {
        /// Id the owner will approve or deny.
        request_id: u64,
        /// Requester's display name.
        username: String,
        /// Requester's key fingerprint.
        fingerprint: Fingerprint,
    },

    /// Publish the full current membership to every member. Must reach
    /// all members before any message encrypted after this change.
    PublishMembership(MembershipUpdate),

    /// Tell the relay (and the requester) the request was approved.
    ApprovalGranted {
        /// Id of the approved request.
        request_id: u64,
        /// Username that was admitted.
        username: String,
    },

    /// Tell the relay (and the requester) the request was denied.
    ApprovalDenied {
        /// Id of the denied request.
        request_id: u64,
    },

    /// The session entered a room and holds a usable key.
    RoomReady {
        /// The room we are in.
        room_code: RoomCode,
        /// Our own key fingerprint, for display/verification.
        fingerprint: Fingerprint,
        /// Membership version the current key reflects.
        key_version: u64,
    },

    /// Our join request was denied; surface to the user.
    NotifyDenied,

    /// Hand an encrypted message to the relay.
    SendEnvelope(WireMessage),

    /// Deliver decrypted plaintext to the application layer.
    DeliverMessage {
        /// Sender's username (untrusted metadata).
        sender: String,
        /// Decrypted plaintext.
        plaintext: String,
        /// Message timestamp (untrusted metadata).
        timestamp_ms: u64,
    },

    /// A message could not be decrypted; render a placeholder rather
    /// than crash or show garbage.
    DeliverUndecryptable {
        /// Claimed sender (untrusted metadata).
        sender: String,
        /// Claimed timestamp (untrusted metadata).
        timestamp_ms: u64,
    },

    /// Announce room closure to all members (owner side).
    PublishRoomClosed {
        /// The room that was closed.
        room_code: RoomCode,
    },

    /// The room is gone; the application should return to its home
    /// screen.
    NotifyClosed {
        /// Human-readable reason.
        reason: String,
    },

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
