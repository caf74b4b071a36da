//! Shared harness: a gateway on an in-memory bus and clients speaking the
//! framed protocol over `tokio::io::duplex`.

#![allow(dead_code)]

use bff_gateway::adapters::auth_chain_verifier::{address_from_key, personal_message_hash};
use bff_gateway::rpc::codec::{read_frame, write_frame};
use bff_gateway::{
    AuthChain, AuthLink, AuthLinkType, CommsGateway, EcdsaAuthChainVerifier, FrameBody,
    GatewayConfig, GetChallengeRequest, PeerAddress, RpcError, RpcFrame, RpcRequest, RpcResponse,
    SignedChallenge, WelcomePeerInformation,
};
use k256::ecdsa::SigningKey;
use shared_bus::InMemoryTopicBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::time::timeout;

pub const MAX_FRAME: usize = 1024 * 1024;
pub const WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub gateway: Arc<CommsGateway>,
    pub bus: InMemoryTopicBus,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let bus = InMemoryTopicBus::new();
        let gateway = CommsGateway::new(
            config,
            Arc::new(bus.clone()),
            Arc::new(EcdsaAuthChainVerifier::new()),
        )
        .expect("valid config");
        Self {
            gateway: Arc::new(gateway),
            bus,
        }
    }

    /// Open a new connection to the gateway.
    pub fn connect(&self) -> TestClient {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move { gateway.serve_connection(server).await });
        TestClient::new(client)
    }

    /// Open a connection and authenticate it with `key`.
    pub async fn connect_as(&self, key: &SigningKey) -> TestClient {
        let mut client = self.connect();
        client.authenticate(key).await;
        client
    }
}

pub struct TestClient {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    next_id: u32,
    pending: Vec<RpcFrame>,
}

impl TestClient {
    fn new(io: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader,
            writer,
            next_id: 1,
            pending: Vec::new(),
        }
    }

    /// Send a request and return its message id.
    pub async fn send(&mut self, request: RpcRequest) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.send_frame(RpcFrame::new(id, FrameBody::Request(request)))
            .await;
        id
    }

    pub async fn send_frame(&mut self, frame: RpcFrame) {
        write_frame(&mut self.writer, &frame, MAX_FRAME)
            .await
            .expect("write frame");
    }

    pub async fn cancel(&mut self, id: u32) {
        self.send_frame(RpcFrame::new(id, FrameBody::Cancel)).await;
    }

    /// Next frame for `id`, buffering frames of other calls.
    pub async fn next_for(&mut self, id: u32) -> FrameBody {
        if let Some(position) = self.pending.iter().position(|f| f.message_id == id) {
            return self.pending.remove(position).body;
        }
        loop {
            let frame = timeout(WAIT, read_frame(&mut self.reader, MAX_FRAME))
                .await
                .expect("Should receive within timeout")
                .expect("valid frame")
                .expect("connection open");
            if frame.message_id == id {
                return frame.body;
            }
            self.pending.push(frame);
        }
    }

    /// Whether a frame for `id` arrives within `wait`.
    pub async fn try_next_for(&mut self, id: u32, wait: Duration) -> Option<FrameBody> {
        timeout(wait, self.next_for(id)).await.ok()
    }

    /// Unary call that must succeed.
    pub async fn call(&mut self, request: RpcRequest) -> RpcResponse {
        let id = self.send(request).await;
        match self.next_for(id).await {
            FrameBody::Response(response) => response,
            other => panic!("Expected response, got {:?}", other),
        }
    }

    /// Unary call that must fail.
    pub async fn call_err(&mut self, request: RpcRequest) -> RpcError {
        let id = self.send(request).await;
        match self.next_for(id).await {
            FrameBody::Error(error) => error,
            other => panic!("Expected error, got {:?}", other),
        }
    }

    /// Next item of a stream, `None` on end of stream.
    pub async fn stream_item(&mut self, id: u32) -> Option<RpcResponse> {
        match self.next_for(id).await {
            FrameBody::StreamItem(item) => Some(item),
            FrameBody::StreamEnd => None,
            other => panic!("Expected stream frame, got {:?}", other),
        }
    }

    /// Wait until the server closes the transport.
    pub async fn closed(&mut self) {
        self.closed_within(WAIT).await;
    }

    pub async fn closed_within(&mut self, wait: Duration) {
        loop {
            match timeout(wait, read_frame(&mut self.reader, MAX_FRAME))
                .await
                .expect("Should close within timeout")
            {
                Ok(Some(frame)) => self.pending.push(frame),
                Ok(None) | Err(_) => return,
            }
        }
    }

    pub async fn challenge(&mut self, address: &PeerAddress) -> String {
        match self
            .call(RpcRequest::GetChallenge(GetChallengeRequest {
                address: address.to_string(),
            }))
            .await
        {
            RpcResponse::Challenge(challenge) => challenge.challenge_to_sign,
            other => panic!("Expected challenge, got {:?}", other),
        }
    }

    pub async fn authenticate(&mut self, key: &SigningKey) -> WelcomePeerInformation {
        let challenge = self.challenge(&address(key)).await;
        match self
            .call(RpcRequest::Authenticate(SignedChallenge {
                auth_chain_json: signed_chain(key, &challenge),
            }))
            .await
        {
            RpcResponse::Welcome(welcome) => welcome,
            other => panic!("Expected welcome, got {:?}", other),
        }
    }
}

pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).expect("valid scalar")
}

pub fn address(key: &SigningKey) -> PeerAddress {
    address_from_key(key.verifying_key())
}

/// `personal_sign` over `message`, hex `r || s || v`.
pub fn sign(key: &SigningKey, message: &str) -> String {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&personal_message_hash(message))
        .expect("signing failed");
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte() + 27);
    format!("0x{}", hex::encode(bytes))
}

/// Auth chain JSON where `key` signs `challenge` directly.
pub fn signed_chain(key: &SigningKey, challenge: &str) -> String {
    AuthChain::new(vec![
        AuthLink {
            kind: AuthLinkType::Signer,
            payload: address(key).to_string(),
            signature: String::new(),
        },
        AuthLink {
            kind: AuthLinkType::EcdsaSignedEntity,
            payload: challenge.to_string(),
            signature: sign(key, challenge),
        },
    ])
    .to_json()
    .expect("serializable chain")
}
