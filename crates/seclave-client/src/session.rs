//! Room session state machine.
//!
//! The `RoomSession` is the top-level state machine that carries one
//! participant through the room lifecycle: create or join, approve and
//! deny join requests, rotate the room key on every membership change,
//! and seal/open messages under the current key.
//!
//! All operations run synchronously on `&mut self`, which serializes
//! every cryptographic operation per session; distinct sessions are
//! fully independent.

use std::collections::HashMap;

use tracing::{debug, info};

use seclave_crypto::{
    Fingerprint, KeyPair, NONCE_SIZE, PublicKeyRecord, RoomCode, RoomKey, derive_room_key,
};

use crate::{
    env::Environment,
    error::SessionError,
    event::{SessionAction, SessionEvent},
    membership::{Member, MembershipSet},
    wire::{MembershipUpdate, WireJoinRequest, WireMessage},
};

/// State shared by the owner and member sides of an active room.
struct RoomState {
    room_code: RoomCode,
    membership: MembershipSet,
    room_key: RoomKey,
    /// Membership version `room_key` was derived from. Always equal to
    /// `membership.version()` outside of a rotation in progress.
    key_version: u64,
}

impl RoomState {
    fn new(room_code: RoomCode, membership: MembershipSet) -> Result<Self, SessionError> {
        let room_key = derive_room_key(&room_code, &membership.keys())?;
        let key_version = membership.version();
        Ok(Self { room_code, membership, room_key, key_version })
    }

    /// Recompute the room key after a membership mutation.
    ///
    /// Must run before any message associated with the new membership is
    /// processed (key-then-message ordering).
    fn rotate_key(&mut self) -> Result<(), SessionError> {
        self.room_key = derive_room_key(&self.room_code, &self.membership.keys())?;
        self.key_version = self.membership.version();
        Ok(())
    }

    fn publish(&self) -> MembershipUpdate {
        MembershipUpdate {
            room_code: self.room_code.as_str().to_string(),
            members: self.membership.to_members(),
            version: self.membership.version(),
        }
    }
}

/// Where the session currently stands in the room lifecycle.
enum SessionState {
    /// Not in a room. Both the starting state and where every exit
    /// (deny, leave, close) lands; the identity survives, so the
    /// participant can create or join again.
    Idle,
    /// Join request submitted, awaiting the owner's decision.
    Requesting { room_code: RoomCode },
    /// We created the room and arbitrate join requests.
    Owner { room: RoomState, pending: HashMap<u64, WireJoinRequest> },
    /// We were admitted to someone else's room.
    Member { room: RoomState },
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting { .. } => "requesting",
            Self::Owner { .. } => "owner",
            Self::Member { .. } => "member",
        }
    }
}

/// One participant's room session.
///
/// Owns the participant's identity key pair for its whole lifetime; room
/// state (membership, key, pending requests) is created and discarded as
/// rooms come and go. Dropping room state zeroizes the key.
pub struct RoomSession<E: Environment> {
    env: E,
    username: String,
    identity: KeyPair,
    public_key: PublicKeyRecord,
    state: SessionState,
}

impl<E: Environment> RoomSession<E> {
    /// Create a session with a freshly generated identity.
    pub fn new(env: E, username: impl Into<String>) -> Self {
        let mut entropy = [0u8; 32];
        env.random_bytes(&mut entropy);
        let identity = KeyPair::from_entropy(entropy);
        let public_key = identity.public_record();

        Self { env, username: username.into(), identity, public_key, state: SessionState::Idle }
    }

    /// This participant's username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// This participant's exported public key.
    pub fn public_key(&self) -> &PublicKeyRecord {
        &self.public_key
    }

    /// Fingerprint of our own public key, for out-of-band verification.
    pub fn fingerprint(&self) -> Result<Fingerprint, SessionError> {
        Ok(self.public_key.fingerprint()?)
    }

    /// The identity key pair, for callers substituting a pairwise
    /// agreement scheme for the membership-hash derivation.
    pub fn identity(&self) -> &KeyPair {
        &self.identity
    }

    /// True when the session holds a usable room key.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Owner { .. } | SessionState::Member { .. })
    }

    /// Code of the current room, if any.
    pub fn room_code(&self) -> Option<&RoomCode> {
        match &self.state {
            SessionState::Idle => None,
            SessionState::Requesting { room_code } => Some(room_code),
            SessionState::Owner { room, .. } | SessionState::Member { room } => {
                Some(&room.room_code)
            },
        }
    }

    /// Membership version the current room key reflects, if active.
    pub fn key_version(&self) -> Option<u64> {
        self.active_room().map(|room| room.key_version)
    }

    /// Current members in sorted-key order, if active.
    pub fn members(&self) -> Option<Vec<Member>> {
        self.active_room().map(|room| room.membership.to_members())
    }

    fn active_room(&self) -> Option<&RoomState> {
        match &self.state {
            SessionState::Owner { room, .. } | SessionState::Member { room } => Some(room),
            _ => None,
        }
    }

    /// Process an event and return resulting actions.
    ///
    /// Errors leave the session state unchanged.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>, SessionError> {
        match event {
            SessionEvent::CreateRoom { room_code } => self.handle_create(&room_code),
            SessionEvent::RequestJoin { room_code } => self.handle_request_join(&room_code),
            SessionEvent::JoinRequestReceived(request) => self.handle_join_request(request),
            SessionEvent::ApproveJoin { request_id } => self.handle_approve(request_id),
            SessionEvent::DenyJoin { request_id } => self.handle_deny(request_id),
            SessionEvent::JoinApproved { room_code, members, version } => {
                self.handle_join_approved(&room_code, members, version)
            },
            SessionEvent::JoinDenied => self.handle_join_denied(),
            SessionEvent::MembershipChanged(update) => self.handle_membership_changed(update),
            SessionEvent::MemberLeft { public_key } => self.handle_member_left(&public_key),
            SessionEvent::SendMessage { plaintext } => self.handle_send(&plaintext),
            SessionEvent::EnvelopeReceived(message) => self.handle_envelope(&message),
            SessionEvent::LeaveRoom => self.handle_leave(),
            SessionEvent::CloseRoom => self.handle_close(),
            SessionEvent::RoomClosed => self.handle_room_closed(),
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState { operation, state: self.state.name() }
    }

    fn handle_create(&mut self, room_code: &str) -> Result<Vec<SessionAction>, SessionError> {
        if !matches!(self.state, SessionState::Idle) {
            return Err(self.invalid("create-room"));
        }

        let room_code = RoomCode::new(room_code);
        let founder =
            Member { username: self.username.clone(), public_key: self.public_key.clone() };
        let room = RoomState::new(room_code.clone(), MembershipSet::founding(founder))?;
        let key_version = room.key_version;

        self.state = SessionState::Owner { room, pending: HashMap::new() };
        info!(room = %room_code, "created room");

        Ok(vec![
            SessionAction::RoomReady {
                room_code: room_code.clone(),
                fingerprint: self.public_key.fingerprint()?,
                key_version,
            },
            SessionAction::Log { message: format!("Created room {room_code} as owner") },
        ])
    }

    fn handle_request_join(&mut self, room_code: &str) -> Result<Vec<SessionAction>, SessionError> {
        if !matches!(self.state, SessionState::Idle) {
            return Err(self.invalid("request-join"));
        }

        let room_code = RoomCode::new(room_code);
        let request = WireJoinRequest {
            request_id: self.env.random_u64(),
            username: self.username.clone(),
            public_key: self.public_key.clone(),
            room_code: room_code.as_str().to_string(),
        };

        self.state = SessionState::Requesting { room_code: room_code.clone() };
        debug!(room = %room_code, request_id = request.request_id, "submitted join request");

        Ok(vec![SessionAction::SubmitJoinRequest(request)])
    }

    fn handle_join_request(
        &mut self,
        request: WireJoinRequest,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let state = self.state.name();
        let SessionState::Owner { room, pending } = &mut self.state else {
            return Err(SessionError::InvalidState { operation: "receive-join-request", state });
        };

        if pending.contains_key(&request.request_id) {
            return Err(SessionError::DuplicateRequest { request_id: request.request_id });
        }
        if room.membership.contains(&request.public_key) {
            return Err(SessionError::AlreadyMember);
        }

        let fingerprint = request.public_key.fingerprint()?;
        let (request_id, username) = (request.request_id, request.username.clone());
        pending.insert(request.request_id, request);

        Ok(vec![
            SessionAction::NotifyJoinRequest { request_id, username: username.clone(), fingerprint },
            SessionAction::Log { message: format!("{username} wants to join") },
        ])
    }

    fn handle_approve(&mut self, request_id: u64) -> Result<Vec<SessionAction>, SessionError> {
        let state = self.state.name();
        let SessionState::Owner { room, pending } = &mut self.state else {
            return Err(SessionError::InvalidState { operation: "approve-join", state });
        };

        let request = pending.get(&request_id).ok_or(SessionError::UnknownRequest { request_id })?;
        if room.membership.contains(&request.public_key) {
            return Err(SessionError::AlreadyMember);
        }

        // Checks passed; the decision is consumed even if derivation
        // below fails (a request never survives its decision).
        let Some(request) = pending.remove(&request_id) else {
            return Err(SessionError::UnknownRequest { request_id });
        };

        room.membership.insert(Member {
            username: request.username.clone(),
            public_key: request.public_key,
        });
        room.rotate_key()?;

        info!(
            room = %room.room_code,
            version = room.membership.version(),
            "approved join, rotated room key"
        );

        Ok(vec![
            SessionAction::PublishMembership(room.publish()),
            SessionAction::ApprovalGranted { request_id, username: request.username },
        ])
    }

    fn handle_deny(&mut self, request_id: u64) -> Result<Vec<SessionAction>, SessionError> {
        let state = self.state.name();
        let SessionState::Owner { pending, .. } = &mut self.state else {
            return Err(SessionError::InvalidState { operation: "deny-join", state });
        };

        // Discarded on decision; no key impact
        pending.remove(&request_id).ok_or(SessionError::UnknownRequest { request_id })?;

        Ok(vec![SessionAction::ApprovalDenied { request_id }])
    }

    fn handle_join_approved(
        &mut self,
        room_code: &str,
        members: Vec<Member>,
        version: u64,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let SessionState::Requesting { room_code: requested } = &self.state else {
            return Err(self.invalid("join-approved"));
        };

        let room_code = RoomCode::new(room_code);
        if &room_code != requested {
            return Err(self.invalid("join-approved for a different room"));
        }

        let membership = MembershipSet::from_update(members, version);
        if !membership.contains(&self.public_key) {
            return Err(SessionError::NotInMembership { version });
        }

        // Derive the identical key independently from the published set
        let room = RoomState::new(room_code.clone(), membership)?;
        let key_version = room.key_version;
        self.state = SessionState::Member { room };

        info!(room = %room_code, version = key_version, "joined room");

        Ok(vec![SessionAction::RoomReady {
            room_code,
            fingerprint: self.public_key.fingerprint()?,
            key_version,
        }])
    }

    fn handle_join_denied(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if !matches!(self.state, SessionState::Requesting { .. }) {
            return Err(self.invalid("join-denied"));
        }

        self.state = SessionState::Idle;
        Ok(vec![SessionAction::NotifyDenied])
    }

    fn handle_membership_changed(
        &mut self,
        update: MembershipUpdate,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match &mut self.state {
            SessionState::Owner { .. } => {
                // We are the authority on membership; snapshots we receive
                // are echoes of our own publications.
                Ok(vec![SessionAction::Log {
                    message: "Ignoring membership snapshot: session is the owner".to_string(),
                }])
            },
            SessionState::Member { room } => {
                if RoomCode::new(&update.room_code) != room.room_code {
                    return Ok(vec![SessionAction::Log {
                        message: format!(
                            "Ignoring membership snapshot for a different room: {}",
                            update.room_code
                        ),
                    }]);
                }
                if update.version <= room.membership.version() {
                    return Ok(vec![SessionAction::Log {
                        message: format!(
                            "Ignoring stale membership snapshot: version {} <= {}",
                            update.version,
                            room.membership.version()
                        ),
                    }]);
                }

                let membership = MembershipSet::from_update(update.members, update.version);
                if !membership.contains(&self.public_key) {
                    // We were removed; the room is over for us
                    self.state = SessionState::Idle;
                    return Ok(vec![SessionAction::NotifyClosed {
                        reason: "removed from the room".to_string(),
                    }]);
                }

                room.membership = membership;
                room.rotate_key()?;

                debug!(
                    room = %room.room_code,
                    version = room.key_version,
                    "applied membership snapshot, rotated room key"
                );

                Ok(vec![SessionAction::Log {
                    message: format!("Room key rotated to version {}", room.key_version),
                }])
            },
            _ => Err(self.invalid("membership-changed")),
        }
    }

    fn handle_member_left(
        &mut self,
        public_key: &PublicKeyRecord,
    ) -> Result<Vec<SessionAction>, SessionError> {
        // The owner departing ends the room, same as an explicit close;
        // it also keeps the membership set non-empty below.
        if matches!(self.state, SessionState::Owner { .. }) && public_key == &self.public_key {
            return self.handle_close();
        }

        let state = self.state.name();
        let SessionState::Owner { room, .. } = &mut self.state else {
            return Err(SessionError::InvalidState { operation: "member-left", state });
        };

        if !room.membership.remove(public_key) {
            return Ok(vec![SessionAction::Log {
                message: "Departing key was not a member; nothing to do".to_string(),
            }]);
        }
        room.rotate_key()?;

        info!(
            room = %room.room_code,
            version = room.membership.version(),
            "member left, rotated room key"
        );

        Ok(vec![SessionAction::PublishMembership(room.publish())])
    }

    fn handle_send(&mut self, plaintext: &str) -> Result<Vec<SessionAction>, SessionError> {
        let (SessionState::Owner { room, .. } | SessionState::Member { room }) = &self.state else {
            return Err(SessionError::NoRoomKey);
        };

        debug_assert_eq!(room.key_version, room.membership.version());

        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);

        let envelope = seclave_crypto::encrypt(&room.room_key, plaintext, nonce);

        Ok(vec![SessionAction::SendEnvelope(WireMessage {
            envelope,
            sender: self.username.clone(),
            timestamp_ms: self.env.wall_clock_ms(),
        })])
    }

    fn handle_envelope(
        &mut self,
        message: &WireMessage,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let (SessionState::Owner { room, .. } | SessionState::Member { room }) = &self.state else {
            return Err(SessionError::NoRoomKey);
        };

        match seclave_crypto::decrypt(&room.room_key, &message.envelope) {
            Ok(plaintext) => Ok(vec![SessionAction::DeliverMessage {
                sender: message.sender.clone(),
                plaintext,
                timestamp_ms: message.timestamp_ms,
            }]),
            Err(error) if error.is_recoverable() => {
                // A bad message renders as a placeholder, never crashes
                debug!(sender = %message.sender, %error, "envelope failed to decrypt");
                Ok(vec![SessionAction::DeliverUndecryptable {
                    sender: message.sender.clone(),
                    timestamp_ms: message.timestamp_ms,
                }])
            },
            Err(error) => Err(error.into()),
        }
    }

    fn handle_leave(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        match &self.state {
            SessionState::Requesting { .. } => {
                // Abandoning a pending request cancels it on our side
                self.state = SessionState::Idle;
                Ok(vec![SessionAction::Log { message: "Abandoned join request".to_string() }])
            },
            SessionState::Member { room } => {
                let room_code = room.room_code.clone();
                self.state = SessionState::Idle;
                Ok(vec![SessionAction::Log { message: format!("Left room {room_code}") }])
            },
            // The owner leaving closes the room for everyone
            SessionState::Owner { .. } => self.handle_close(),
            SessionState::Idle => Err(self.invalid("leave-room")),
        }
    }

    fn handle_close(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        let SessionState::Owner { room, .. } = &self.state else {
            return Err(self.invalid("close-room"));
        };

        let room_code = room.room_code.clone();
        // Drops membership, pending requests, and the key (zeroized)
        self.state = SessionState::Idle;

        info!(room = %room_code, "closed room");

        Ok(vec![
            SessionAction::PublishRoomClosed { room_code },
            SessionAction::NotifyClosed { reason: "room closed".to_string() },
        ])
    }

    fn handle_room_closed(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            SessionState::Member { .. } | SessionState::Requesting { .. } => {
                self.state = SessionState::Idle;
                Ok(vec![SessionAction::NotifyClosed {
                    reason: "room was closed by the owner".to_string(),
                }])
            },
            _ => Err(self.invalid("room-closed")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::env::test_utils::MockEnv;

    use super::*;

    fn session(name: &str) -> RoomSession<MockEnv> {
        // Seed from a hash of the name so distinct names never share an
        // identity key (a plain `name.len()` seed collides for e.g.
        // "alice" and "carol").
        use std::hash::{DefaultHasher, Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        RoomSession::new(MockEnv::with_seed(hasher.finish()), name)
    }

    fn owner_with_room(name: &str, code: &str) -> RoomSession<MockEnv> {
        let mut owner = session(name);
        owner.handle(SessionEvent::CreateRoom { room_code: code.to_string() }).unwrap();
        owner
    }

    /// Drive a full request/approve handshake between an owner and a
    /// joiner, returning the membership snapshot the owner published.
    fn admit(
        owner: &mut RoomSession<MockEnv>,
        joiner: &mut RoomSession<MockEnv>,
        code: &str,
    ) -> MembershipUpdate {
        let actions = joiner.handle(SessionEvent::RequestJoin { room_code: code.to_string() }).unwrap();
        let SessionAction::SubmitJoinRequest(request) = &actions[0] else {
            panic!("expected SubmitJoinRequest, got {actions:?}");
        };

        owner.handle(SessionEvent::JoinRequestReceived(request.clone())).unwrap();
        let actions =
            owner.handle(SessionEvent::ApproveJoin { request_id: request.request_id }).unwrap();

        let SessionAction::PublishMembership(update) = &actions[0] else {
            panic!("expected PublishMembership, got {actions:?}");
        };

        joiner
            .handle(SessionEvent::JoinApproved {
                room_code: update.room_code.clone(),
                members: update.members.clone(),
                version: update.version,
            })
            .unwrap();

        update.clone()
    }

    #[test]
    fn create_room_becomes_owner() {
        let mut owner = session("alice");
        let actions =
            owner.handle(SessionEvent::CreateRoom { room_code: "abc123".to_string() }).unwrap();

        assert!(owner.is_active());
        assert_eq!(owner.room_code().unwrap().as_str(), "ABC123");
        assert_eq!(owner.key_version(), Some(1));
        assert!(matches!(actions[0], SessionAction::RoomReady { key_version: 1, .. }));
    }

    #[test]
    fn create_while_in_room_fails() {
        let mut owner = owner_with_room("alice", "ABC123");
        let result = owner.handle(SessionEvent::CreateRoom { room_code: "XYZ789".to_string() });
        assert!(matches!(result, Err(SessionError::InvalidState { state: "owner", .. })));
    }

    #[test]
    fn send_without_room_fails() {
        let mut idle = session("alice");
        let result = idle.handle(SessionEvent::SendMessage { plaintext: "hi".to_string() });
        assert!(matches!(result, Err(SessionError::NoRoomKey)));
    }

    #[test]
    fn receive_without_room_fails() {
        let mut idle = session("alice");
        let mut owner = owner_with_room("bob", "ABC123");
        let actions =
            owner.handle(SessionEvent::SendMessage { plaintext: "hi".to_string() }).unwrap();
        let SessionAction::SendEnvelope(message) = &actions[0] else { panic!() };

        let result = idle.handle(SessionEvent::EnvelopeReceived(message.clone()));
        assert!(matches!(result, Err(SessionError::NoRoomKey)));
    }

    #[test]
    fn approve_admits_and_rotates_key() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");

        assert_eq!(owner.key_version(), Some(1));
        let update = admit(&mut owner, &mut joiner, "ABC123");

        assert_eq!(update.version, 2);
        assert_eq!(owner.key_version(), Some(2));
        assert_eq!(joiner.key_version(), Some(2));
        assert_eq!(owner.members().unwrap().len(), 2);
    }

    #[test]
    fn both_sides_derive_identical_key() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");
        admit(&mut owner, &mut joiner, "ABC123");

        // Owner encrypts, joiner decrypts: only possible with identical keys
        let actions =
            owner.handle(SessionEvent::SendMessage { plaintext: "hello".to_string() }).unwrap();
        let SessionAction::SendEnvelope(message) = &actions[0] else { panic!() };

        let actions = joiner.handle(SessionEvent::EnvelopeReceived(message.clone())).unwrap();
        assert!(matches!(
            &actions[0],
            SessionAction::DeliverMessage { plaintext, sender, .. }
                if plaintext == "hello" && sender == "alice"
        ));
    }

    #[test]
    fn message_under_old_key_is_undecryptable_after_rotation() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");

        // Encrypted under K0 ({alice} only)
        let actions =
            owner.handle(SessionEvent::SendMessage { plaintext: "early".to_string() }).unwrap();
        let SessionAction::SendEnvelope(stale) = actions.into_iter().next().unwrap() else {
            panic!()
        };

        // Rotation to K1 ({alice, bob})
        admit(&mut owner, &mut joiner, "ABC123");

        let actions = joiner.handle(SessionEvent::EnvelopeReceived(stale)).unwrap();
        assert!(matches!(actions[0], SessionAction::DeliverUndecryptable { .. }));
    }

    #[test]
    fn deny_leaves_membership_untouched() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");

        let actions = joiner
            .handle(SessionEvent::RequestJoin { room_code: "ABC123".to_string() })
            .unwrap();
        let SessionAction::SubmitJoinRequest(request) = &actions[0] else { panic!() };

        owner.handle(SessionEvent::JoinRequestReceived(request.clone())).unwrap();
        let actions =
            owner.handle(SessionEvent::DenyJoin { request_id: request.request_id }).unwrap();

        assert!(matches!(actions[0], SessionAction::ApprovalDenied { .. }));
        assert_eq!(owner.key_version(), Some(1));
        assert_eq!(owner.members().unwrap().len(), 1);

        let actions = joiner.handle(SessionEvent::JoinDenied).unwrap();
        assert!(matches!(actions[0], SessionAction::NotifyDenied));
        assert!(!joiner.is_active());
    }

    #[test]
    fn approve_twice_never_double_adds() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");

        let actions = joiner
            .handle(SessionEvent::RequestJoin { room_code: "ABC123".to_string() })
            .unwrap();
        let SessionAction::SubmitJoinRequest(request) = &actions[0] else { panic!() };

        owner.handle(SessionEvent::JoinRequestReceived(request.clone())).unwrap();
        owner.handle(SessionEvent::ApproveJoin { request_id: request.request_id }).unwrap();

        let result = owner.handle(SessionEvent::ApproveJoin { request_id: request.request_id });
        assert!(matches!(result, Err(SessionError::UnknownRequest { .. })));
        assert_eq!(owner.members().unwrap().len(), 2);
        assert_eq!(owner.key_version(), Some(2));
    }

    #[test]
    fn duplicate_request_id_is_rejected() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");

        let actions = joiner
            .handle(SessionEvent::RequestJoin { room_code: "ABC123".to_string() })
            .unwrap();
        let SessionAction::SubmitJoinRequest(request) = &actions[0] else { panic!() };

        owner.handle(SessionEvent::JoinRequestReceived(request.clone())).unwrap();
        let result = owner.handle(SessionEvent::JoinRequestReceived(request.clone()));
        assert!(matches!(result, Err(SessionError::DuplicateRequest { .. })));
    }

    #[test]
    fn request_from_existing_member_is_rejected() {
        let mut owner = owner_with_room("alice", "ABC123");
        let request = WireJoinRequest {
            request_id: 99,
            username: "alice-again".to_string(),
            public_key: owner.public_key().clone(),
            room_code: "ABC123".to_string(),
        };

        let result = owner.handle(SessionEvent::JoinRequestReceived(request));
        assert!(matches!(result, Err(SessionError::AlreadyMember)));
    }

    #[test]
    fn member_left_rotates_and_republishes() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");
        admit(&mut owner, &mut joiner, "ABC123");

        let departing = joiner.public_key().clone();
        let actions = owner.handle(SessionEvent::MemberLeft { public_key: departing }).unwrap();

        let SessionAction::PublishMembership(update) = &actions[0] else {
            panic!("expected PublishMembership, got {actions:?}");
        };
        assert_eq!(update.version, 3);
        assert_eq!(update.members.len(), 1);
        assert_eq!(owner.key_version(), Some(3));
    }

    #[test]
    fn owner_key_departure_closes_instead_of_corrupting() {
        let mut owner = owner_with_room("alice", "ABC123");

        // The sole member's own key leaving cannot produce an empty
        // membership mid-rotation; it ends the room like a close.
        let actions =
            owner.handle(SessionEvent::MemberLeft { public_key: owner.public_key().clone() }).unwrap();
        assert!(matches!(actions[0], SessionAction::PublishRoomClosed { .. }));
        assert!(!owner.is_active());
        assert!(owner.members().is_none());
    }

    #[test]
    fn owner_key_departure_with_members_also_closes() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");
        admit(&mut owner, &mut joiner, "ABC123");

        let actions =
            owner.handle(SessionEvent::MemberLeft { public_key: owner.public_key().clone() }).unwrap();
        assert!(matches!(actions[0], SessionAction::PublishRoomClosed { .. }));
        assert!(!owner.is_active());
    }

    #[test]
    fn failed_member_left_leaves_state_untouched() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");
        admit(&mut owner, &mut joiner, "ABC123");

        // Unknown key: no version bump, no rotation, same membership
        let ghost = session("carol").public_key().clone();
        owner.handle(SessionEvent::MemberLeft { public_key: ghost }).unwrap();
        assert_eq!(owner.key_version(), Some(2));
        assert_eq!(owner.members().unwrap().len(), 2);
    }

    #[test]
    fn snapshot_for_a_different_room_is_ignored() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");
        let update = admit(&mut owner, &mut joiner, "ABC123");

        // Forged snapshot: foreign room, higher version
        let forged = MembershipUpdate {
            room_code: "ZZZ999".to_string(),
            members: update.members,
            version: 12,
        };
        let actions = joiner.handle(SessionEvent::MembershipChanged(forged)).unwrap();
        assert!(matches!(
            &actions[0],
            SessionAction::Log { message } if message.contains("different room")
        ));
        assert_eq!(joiner.key_version(), Some(2));
        assert_eq!(joiner.room_code().unwrap().as_str(), "ABC123");
    }

    #[test]
    fn stale_membership_snapshot_is_ignored() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");
        let update = admit(&mut owner, &mut joiner, "ABC123");

        // Replay of the same snapshot: version not newer, key untouched
        let actions = joiner
            .handle(SessionEvent::MembershipChanged(update))
            .unwrap();
        assert!(matches!(&actions[0], SessionAction::Log { message } if message.contains("stale")));
        assert_eq!(joiner.key_version(), Some(2));
    }

    #[test]
    fn removal_via_snapshot_ends_the_room_for_us() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");
        admit(&mut owner, &mut joiner, "ABC123");

        // Owner removes the joiner and publishes without their key
        let actions = owner
            .handle(SessionEvent::MemberLeft { public_key: joiner.public_key().clone() })
            .unwrap();
        let SessionAction::PublishMembership(update) = &actions[0] else { panic!() };

        let actions = joiner.handle(SessionEvent::MembershipChanged(update.clone())).unwrap();
        assert!(matches!(actions[0], SessionAction::NotifyClosed { .. }));
        assert!(!joiner.is_active());
    }

    #[test]
    fn owner_close_discards_everything() {
        let mut owner = owner_with_room("alice", "ABC123");
        let mut joiner = session("bob");
        admit(&mut owner, &mut joiner, "ABC123");

        let actions = owner.handle(SessionEvent::CloseRoom).unwrap();
        assert!(matches!(actions[0], SessionAction::PublishRoomClosed { .. }));
        assert!(!owner.is_active());
        assert!(owner.members().is_none());

        let actions = joiner.handle(SessionEvent::RoomClosed).unwrap();
        assert!(matches!(actions[0], SessionAction::NotifyClosed { .. }));
        assert!(!joiner.is_active());
    }

    #[test]
    fn closed_session_can_start_over() {
        let mut owner = owner_with_room("alice", "ABC123");
        owner.handle(SessionEvent::CloseRoom).unwrap();

        let actions =
            owner.handle(SessionEvent::CreateRoom { room_code: "XYZ789".to_string() }).unwrap();
        assert!(matches!(actions[0], SessionAction::RoomReady { .. }));
        assert_eq!(owner.room_code().unwrap().as_str(), "XYZ789");
    }

    #[test]
    fn abandoning_a_pending_request_returns_to_idle() {
        let mut joiner = session("bob");
        joiner.handle(SessionEvent::RequestJoin { room_code: "ABC123".to_string() }).unwrap();
        assert!(!joiner.is_active());

        joiner.handle(SessionEvent::LeaveRoom).unwrap();
        let result = joiner.handle(SessionEvent::JoinDenied);
        assert!(matches!(result, Err(SessionError::InvalidState { state: "idle", .. })));
    }

    #[test]
    fn tampered_envelope_renders_placeholder() {
        let mut owner = owner_with_room("alice", "ABC123");

        let actions =
            owner.handle(SessionEvent::SendMessage { plaintext: "secret".to_string() }).unwrap();
        let SessionAction::SendEnvelope(mut message) = actions.into_iter().next().unwrap() else {
            panic!()
        };
        message.envelope.ciphertext = "AAAA".to_string();

        let actions = owner.handle(SessionEvent::EnvelopeReceived(message)).unwrap();
        assert!(matches!(actions[0], SessionAction::DeliverUndecryptable { .. }));
        // Session is still usable afterwards
        assert!(owner.is_active());
    }

    #[test]
    fn every_decrypt_failure_class_renders_placeholder() {
        let mut owner = owner_with_room("alice", "ABC123");

        let actions =
            owner.handle(SessionEvent::SendMessage { plaintext: "secret".to_string() }).unwrap();
        let SessionAction::SendEnvelope(message) = actions.into_iter().next().unwrap() else {
            panic!()
        };

        // Malformed base64, short nonce, and failed authentication are
        // all recoverable: placeholder out, session intact.
        let mut garbled = message.clone();
        garbled.envelope.ciphertext = "!!!not base64!!!".to_string();
        let mut short_nonce = message.clone();
        short_nonce.envelope.nonce = seclave_crypto::codec::encode(&[0u8; 4]);
        let mut wrong_tag = message;
        wrong_tag.envelope.nonce = seclave_crypto::codec::encode(&[0u8; 12]);

        for broken in [garbled, short_nonce, wrong_tag] {
            let actions = owner.handle(SessionEvent::EnvelopeReceived(broken)).unwrap();
            assert!(matches!(actions[0], SessionAction::DeliverUndecryptable { .. }));
        }
        assert!(owner.is_active());
    }

    #[test]
    fn room_code_case_is_normalized_once() {
        let mut owner = owner_with_room("alice", "abc123");
        let mut joiner = session("bob");

        // Joiner types it lower-case; both normalize to the same salt
        let update = admit(&mut owner, &mut joiner, "abc123");
        assert_eq!(update.room_code, "ABC123");
        assert_eq!(joiner.room_code().unwrap().as_str(), "ABC123");
    }
}
