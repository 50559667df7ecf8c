use axum::{Router, extract::State, http::header, response::IntoResponse, routing::get};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use url::Url;

use docscan_gateway::auth::provider::IdentityProviderVerifier;
use docscan_gateway::auth::{AuthError, Identity, TokenVerifier};

const AUDIENCE: &str = "docscan-project";
const ISSUER: &str = "https://securetoken.google.com/docscan-project";
const KID: &str = "test-key-1";

async fn serve_jwks(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    (
        [(header::CONTENT_TYPE, "application/json")],
        include_str!("fixtures/idp_test_jwks.json"),
    )
}

async fn spawn_provider() -> (IdentityProviderVerifier, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/jwks", get(serve_jwks))
        .with_state(hits.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let verifier = IdentityProviderVerifier::new(
        reqwest::Client::new(),
        Url::parse(&format!("http://{addr}/jwks")).unwrap(),
        None,
        AUDIENCE.to_string(),
    );
    (verifier, hits)
}

fn sign(kid: &str, claims: Value) -> String {
    let key = EncodingKey::from_rsa_pem(include_bytes!("fixtures/idp_test_key.pem")).unwrap();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(&header, &claims, &key).unwrap()
}

fn claims(aud: &str, iss: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": "idp-user-1",
        "email": "reader@example.com",
        "aud": aud,
        "iss": iss,
        "iat": now,
        "exp": now + 600,
    })
}

#[tokio::test]
async fn accepts_token_for_configured_audience_and_issuer() {
    let (verifier, hits) = spawn_provider().await;
    let identity = verifier
        .verify(&sign(KID, claims(AUDIENCE, ISSUER)))
        .await
        .unwrap();
    assert_eq!(
        identity,
        Identity {
            user_id: "idp-user-1".to_string(),
            email: Some("reader@example.com".to_string()),
        }
    );

    // second token is checked against the cached key set
    verifier
        .verify(&sign(KID, claims(AUDIENCE, ISSUER)))
        .await
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn user_id_claim_wins_over_subject() {
    let (verifier, _hits) = spawn_provider().await;
    let mut body = claims(AUDIENCE, ISSUER);
    body["user_id"] = json!("uid-from-claim");
    let identity = verifier.verify(&sign(KID, body)).await.unwrap();
    assert_eq!(identity.user_id, "uid-from-claim");
}

#[tokio::test]
async fn rejects_wrong_audience() {
    let (verifier, _hits) = spawn_provider().await;
    let result = verifier
        .verify(&sign(KID, claims("someone-else", ISSUER)))
        .await;
    assert_eq!(result, Err(AuthError::InvalidCredential));
}

#[tokio::test]
async fn rejects_wrong_issuer() {
    let (verifier, _hits) = spawn_provider().await;
    let result = verifier
        .verify(&sign(
            KID,
            claims(AUDIENCE, "https://securetoken.google.com/other"),
        ))
        .await;
    assert_eq!(result, Err(AuthError::InvalidCredential));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let (verifier, _hits) = spawn_provider().await;
    let mut body = claims(AUDIENCE, ISSUER);
    let past = Utc::now().timestamp() - 3600;
    body["iat"] = json!(past - 600);
    body["exp"] = json!(past);
    let result = verifier.verify(&sign(KID, body)).await;
    assert_eq!(result, Err(AuthError::InvalidCredential));
}

#[tokio::test]
async fn unknown_kid_does_not_refetch_keys_on_every_request() {
    let (verifier, hits) = spawn_provider().await;
    verifier
        .verify(&sign(KID, claims(AUDIENCE, ISSUER)))
        .await
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    for _ in 0..5 {
        let result = verifier
            .verify(&sign("rotated-away", claims(AUDIENCE, ISSUER)))
            .await;
        assert_eq!(result, Err(AuthError::InvalidCredential));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
