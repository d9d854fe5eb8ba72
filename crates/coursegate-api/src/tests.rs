//! Router tests against an in-memory store and a fake payment gateway.

use std::{path::PathBuf, sync::Mutex};

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use chrono::Duration;
use coursegate_core::{
  Tier,
  access::PurchasePolicy,
  course::{Course, NewCourse, NewDownload, NewModule},
  entitlement::PaymentStatus,
  payment::{
    ConfirmationStatus, PaymentConfirmation, PaymentGateway, PaymentLink,
    PaymentLinkRequest,
  },
  store::LearningStore,
  upgrade::UpgradePricing,
};
use coursegate_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{AppState, PaymentSettings, ServerConfig, router, session::issue_session};

const SECRET: &str = "test-webhook-secret";
const ADMIN: &str = "owner@example.com";

// ─── Fixtures ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeGateway {
  requests: Mutex<Vec<PaymentLinkRequest>>,
  fail:     bool,
}

#[derive(Debug, thiserror::Error)]
#[error("gateway unavailable")]
struct FakeGatewayError;

impl PaymentGateway for FakeGateway {
  type Error = FakeGatewayError;

  async fn create_payment_link<'a>(
    &'a self,
    request: &'a PaymentLinkRequest,
  ) -> Result<PaymentLink, FakeGatewayError> {
    self.requests.lock().unwrap().push(request.clone());
    if self.fail {
      return Err(FakeGatewayError);
    }
    Ok(PaymentLink {
      success:          true,
      payment_link_url: Some(format!("https://pay.example/{}", request.product_id)),
    })
  }
}

type State = AppState<SqliteStore, FakeGateway>;

fn config(policy: PurchasePolicy) -> ServerConfig {
  ServerConfig {
    host:                "127.0.0.1".to_string(),
    port:                8080,
    store_path:          PathBuf::from(":memory:"),
    admin_emails:        vec![ADMIN.to_uppercase()],
    purchase_policy:     policy,
    session_ttl_hours:   1,
    watch_interval_secs: 1,
    upgrade_prices:      UpgradePricing { basic: Some(1900), premium: Some(4900) },
    payment:             PaymentSettings {
      link_endpoint:  "http://127.0.0.1:9/links".to_string(),
      webhook_secret: SECRET.to_string(),
    },
  }
}

async fn make_state_with(gateway: FakeGateway, policy: PurchasePolicy) -> State {
  let store = SqliteStore::open_in_memory().await.unwrap();
  AppState::new(store, gateway, config(policy))
}

async fn make_state() -> State {
  make_state_with(FakeGateway::default(), PurchasePolicy::default()).await
}

async fn login(state: &State, email: &str) -> (Uuid, String) {
  let user_id = Uuid::new_v4();
  let token = issue_session(&*state.store, user_id, email.into(), Duration::hours(1))
    .await
    .unwrap();
  (user_id, token)
}

async fn call(
  state:  &State,
  method: &str,
  uri:    &str,
  token:  Option<&str>,
  body:   Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(token) = token {
    builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
  }
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };

  let resp = router(state.clone())
    .oneshot(builder.body(body).unwrap())
    .await
    .unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
    .await
    .unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

async fn course(state: &State, tier: Tier, price: i64) -> Course {
  state
    .store
    .add_course(NewCourse::new("Course", tier, price))
    .await
    .unwrap()
}

/// The id of a serialised entitlement or tier upgrade.
fn attempt_id(attempt: &Value) -> Uuid {
  attempt
    .get("entitlement_id")
    .or_else(|| attempt.get("upgrade_id"))
    .and_then(Value::as_str)
    .unwrap()
    .parse()
    .unwrap()
}

fn confirmation(attempt: &Value, amount: i64, status: ConfirmationStatus) -> PaymentConfirmation {
  PaymentConfirmation {
    attempt_id: attempt_id(attempt),
    payment_ref: "pay_42".into(),
    amount,
    status,
    signature: String::new(),
  }
}

fn signed(attempt: &Value, amount: i64, status: ConfirmationStatus) -> Value {
  let c = confirmation(attempt, amount, status)
    .signed(SECRET.as_bytes())
    .unwrap();
  serde_json::to_value(c).unwrap()
}

/// Purchase and confirm `course_id` for `token`; returns the confirmation body.
async fn buy(state: &State, token: &str, course_id: Uuid, price: i64) -> Value {
  let (status, body) = call(
    state,
    "POST",
    &format!("/courses/{course_id}/purchase"),
    Some(token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");

  let (status, body) = call(
    state,
    "POST",
    "/payments/confirm",
    None,
    Some(signed(&body["entitlement"], price, ConfirmationStatus::Completed)),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{body}");
  body
}

// ─── Sessions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn me_requires_a_session() {
  let state = make_state().await;
  let (status, body) = call(&state, "GET", "/me", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["kind"], "unauthenticated");

  let (status, _) = call(&state, "GET", "/me", Some("made-up"), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let (_, token) = login(&state, "learner@example.com").await;
  let (status, body) = call(&state, "GET", "/me", Some(&token), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["email"], "learner@example.com");
  assert_eq!(body["subscription_tier"], "free");
}

#[tokio::test]
async fn expired_sessions_are_anonymous() {
  let state = make_state().await;
  let token = issue_session(
    &*state.store,
    Uuid::new_v4(),
    "late@example.com".into(),
    Duration::hours(-1),
  )
  .await
  .unwrap();
  let (status, _) = call(&state, "GET", "/me", Some(&token), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ─── Access decisions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_access_fails_closed() {
  let state = make_state().await;
  let c = course(&state, Tier::Free, 0).await;
  state
    .store
    .add_module(c.course_id, NewModule::new(1, "Intro", Tier::Free))
    .await
    .unwrap();

  let (status, body) = call(
    &state,
    "GET",
    &format!("/courses/{}/access", c.course_id),
    None,
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["authenticated"], false);
  assert_eq!(body["course_access"], false);
  assert_eq!(body["can_purchase"], false);
  assert_eq!(body["modules"][0]["accessible"], false);
}

#[tokio::test]
async fn premium_flag_locks_module_for_basic_buyer() {
  let state = make_state().await;
  let (user_id, token) = login(&state, "basic@example.com").await;
  state.store.set_tier(user_id, Tier::Basic).await.unwrap();

  let c = course(&state, Tier::Basic, 4900).await;
  state
    .store
    .add_module(c.course_id, NewModule::new(1, "M1", Tier::Basic))
    .await
    .unwrap();
  state
    .store
    .add_module(c.course_id, NewModule::new(2, "M2", Tier::Basic).premium())
    .await
    .unwrap();

  buy(&state, &token, c.course_id, 4900).await;

  let (status, body) = call(
    &state,
    "GET",
    &format!("/courses/{}/access", c.course_id),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["course_access"], true);
  assert_eq!(body["entitlement"], "completed");
  assert_eq!(body["modules"][0]["accessible"], true);
  assert_eq!(body["modules"][1]["accessible"], false);
}

#[tokio::test]
async fn premium_download_urls_are_withheld() {
  let state = make_state().await;
  let (_, token) = login(&state, "learner@example.com").await;
  let c = course(&state, Tier::Free, 0).await;
  for (title, is_premium) in [("Notes", false), ("Workbook", true)] {
    state
      .store
      .add_download(
        c.course_id,
        NewDownload {
          title: title.into(),
          url: format!("https://cdn.example/{title}.pdf"),
          is_premium,
        },
      )
      .await
      .unwrap();
  }
  buy(&state, &token, c.course_id, 0).await;

  let (status, body) = call(
    &state,
    "GET",
    &format!("/courses/{}/downloads", c.course_id),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body[0]["accessible"], true);
  assert_eq!(body[0]["url"], "https://cdn.example/Notes.pdf");
  assert_eq!(body[1]["accessible"], false);
  assert_eq!(body[1]["url"], Value::Null);
}

// ─── Purchases ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lower_tier_is_told_to_upgrade() {
  let state = make_state().await;
  let (_, token) = login(&state, "free@example.com").await;
  let c = course(&state, Tier::Basic, 4900).await;

  let (status, body) = call(
    &state,
    "POST",
    &format!("/courses/{}/purchase", c.course_id),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["kind"], "denied");
  assert!(state.gateway.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn open_policy_sells_to_any_tier_and_upgrades_once() {
  let state = make_state_with(FakeGateway::default(), PurchasePolicy::AllowAnyTier).await;
  let (user_id, token) = login(&state, "free@example.com").await;
  let c = course(&state, Tier::Premium, 9900).await;

  let (status, body) = call(
    &state,
    "POST",
    &format!("/courses/{}/purchase", c.course_id),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  let entitlement = body["entitlement"].clone();
  assert!(
    body["payment_link_url"]
      .as_str()
      .unwrap()
      .starts_with("https://pay.example/")
  );
  {
    let sent = state.gateway.requests.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].amount, 9900);
    assert_eq!(sent[0].email, "free@example.com");
  }

  let callback = signed(&entitlement, 9900, ConfirmationStatus::Completed);
  let (status, first) =
    call(&state, "POST", "/payments/confirm", None, Some(callback.clone())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(first["newly_completed"], true);
  assert_eq!(first["upgraded_to"], "premium");

  let (status, second) =
    call(&state, "POST", "/payments/confirm", None, Some(callback)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(second["newly_completed"], false);
  assert_eq!(second["upgraded_to"], Value::Null);

  let profile = state.store.get_profile(user_id).await.unwrap().unwrap();
  assert_eq!(profile.subscription_tier, Tier::Premium);

  let (_, log) = call(&state, "GET", "/me/activity", Some(&token), None).await;
  let purchases = log
    .as_array()
    .unwrap()
    .iter()
    .filter(|a| a["kind"] == "course_purchase")
    .count();
  assert_eq!(purchases, 1);

  let (status, body) = call(
    &state,
    "POST",
    &format!("/courses/{}/purchase", c.course_id),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn gateway_failure_keeps_the_pending_row() {
  let gateway = FakeGateway { fail: true, ..Default::default() };
  let state = make_state_with(gateway, PurchasePolicy::default()).await;
  let (user_id, token) = login(&state, "learner@example.com").await;
  let c = course(&state, Tier::Free, 500).await;

  let (status, body) = call(
    &state,
    "POST",
    &format!("/courses/{}/purchase", c.course_id),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::BAD_GATEWAY);
  assert_eq!(body["kind"], "retry");

  let rows = state
    .store
    .list_entitlements(user_id, Some(c.course_id))
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn forged_or_short_callbacks_change_nothing() {
  let state = make_state().await;
  let (_, token) = login(&state, "learner@example.com").await;
  let c = course(&state, Tier::Free, 1500).await;

  let (_, body) = call(
    &state,
    "POST",
    &format!("/courses/{}/purchase", c.course_id),
    Some(&token),
    None,
  )
  .await;
  let entitlement = body["entitlement"].clone();
  let id: Uuid = entitlement["entitlement_id"].as_str().unwrap().parse().unwrap();

  let forged = confirmation(&entitlement, 1500, ConfirmationStatus::Completed)
    .signed(b"not-the-secret")
    .unwrap();
  let (status, body) = call(
    &state,
    "POST",
    "/payments/confirm",
    None,
    Some(serde_json::to_value(forged).unwrap()),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "invalid");

  let short = signed(&entitlement, 1, ConfirmationStatus::Completed);
  let (status, _) = call(&state, "POST", "/payments/confirm", None, Some(short)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let row = state.store.get_entitlement(id).await.unwrap().unwrap();
  assert_eq!(row.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn failed_payment_allows_a_fresh_attempt() {
  let state = make_state().await;
  let (_, token) = login(&state, "learner@example.com").await;
  let c = course(&state, Tier::Free, 700).await;
  let uri = format!("/courses/{}/purchase", c.course_id);

  let (_, body) = call(&state, "POST", &uri, Some(&token), None).await;
  let first = body["entitlement"].clone();

  let (status, body) = call(
    &state,
    "POST",
    "/payments/confirm",
    None,
    Some(signed(&first, 700, ConfirmationStatus::Failed)),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["entitlement"]["payment_status"], "failed");

  let (status, body) = call(&state, "POST", &uri, Some(&token), None).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_ne!(body["entitlement"]["entitlement_id"], first["entitlement_id"]);
}

#[tokio::test]
async fn confirm_unknown_entitlement_is_404() {
  let state = make_state().await;
  let fake = json!({ "entitlement_id": Uuid::new_v4().to_string() });
  let (status, _) = call(
    &state,
    "POST",
    "/payments/confirm",
    None,
    Some(signed(&fake, 100, ConfirmationStatus::Completed)),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Tier upgrades ────────────────────────────────────────────────────────────

#[tokio::test]
async fn paid_upgrade_raises_the_tier_once() {
  let state = make_state().await;
  let (user_id, token) = login(&state, "learner@example.com").await;

  let (status, body) = call(
    &state,
    "POST",
    "/me/upgrade",
    Some(&token),
    Some(json!({ "tier": "premium" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  let upgrade = body["upgrade"].clone();
  assert_eq!(upgrade["from_tier"], "free");
  assert_eq!(upgrade["target_tier"], "premium");
  assert_eq!(upgrade["price"], 4900);
  assert_eq!(upgrade["payment_status"], "pending");
  {
    let sent = state.gateway.requests.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].amount, 4900);
    assert_eq!(sent[0].product_id, upgrade["upgrade_id"].as_str().unwrap());
  }

  let callback = signed(&upgrade, 4900, ConfirmationStatus::Completed);
  let (status, first) = call(
    &state,
    "POST",
    "/payments/upgrades/confirm",
    None,
    Some(callback.clone()),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{first}");
  assert_eq!(first["newly_completed"], true);
  assert_eq!(first["upgraded_to"], "premium");
  assert_eq!(first["upgrade"]["payment_status"], "completed");

  let (status, second) =
    call(&state, "POST", "/payments/upgrades/confirm", None, Some(callback)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(second["newly_completed"], false);
  assert_eq!(second["upgraded_to"], Value::Null);

  let profile = state.store.get_profile(user_id).await.unwrap().unwrap();
  assert_eq!(profile.subscription_tier, Tier::Premium);

  let (_, log) = call(&state, "GET", "/me/activity", Some(&token), None).await;
  let upgrades: Vec<&Value> = log
    .as_array()
    .unwrap()
    .iter()
    .filter(|a| a["kind"] == "tier_upgrade")
    .collect();
  assert_eq!(upgrades.len(), 1);
  assert_eq!(upgrades[0]["metadata"]["from"], "free");
  assert_eq!(upgrades[0]["metadata"]["to"], "premium");

  // Premium now qualifies for a premium course under the default policy.
  let c = course(&state, Tier::Premium, 9900).await;
  let (status, body) = call(
    &state,
    "POST",
    &format!("/courses/{}/purchase", c.course_id),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
}

#[tokio::test]
async fn upgrade_requests_are_validated() {
  let state = AppState::new(
    SqliteStore::open_in_memory().await.unwrap(),
    FakeGateway::default(),
    ServerConfig {
      upgrade_prices: UpgradePricing { basic: Some(1900), premium: None },
      ..config(PurchasePolicy::default())
    },
  );
  let (user_id, token) = login(&state, "learner@example.com").await;

  let body = json!({ "tier": "basic" });
  let (status, _) = call(&state, "POST", "/me/upgrade", None, Some(body.clone())).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let (status, err) = call(
    &state,
    "POST",
    "/me/upgrade",
    Some(&token),
    Some(json!({ "tier": "premium" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(err["kind"], "invalid");

  state.store.set_tier(user_id, Tier::Basic).await.unwrap();
  let (status, err) = call(&state, "POST", "/me/upgrade", Some(&token), Some(body)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(err["kind"], "conflict");
  assert!(state.gateway.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn forged_upgrade_callbacks_change_nothing() {
  let state = make_state().await;
  let (user_id, token) = login(&state, "learner@example.com").await;

  let (_, body) = call(
    &state,
    "POST",
    "/me/upgrade",
    Some(&token),
    Some(json!({ "tier": "basic" })),
  )
  .await;
  let upgrade = body["upgrade"].clone();

  let forged = confirmation(&upgrade, 1900, ConfirmationStatus::Completed)
    .signed(b"not-the-secret")
    .unwrap();
  let (status, _) = call(
    &state,
    "POST",
    "/payments/upgrades/confirm",
    None,
    Some(serde_json::to_value(forged).unwrap()),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let short = signed(&upgrade, 100, ConfirmationStatus::Completed);
  let (status, _) =
    call(&state, "POST", "/payments/upgrades/confirm", None, Some(short)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let fake = json!({ "upgrade_id": Uuid::new_v4().to_string() });
  let (status, _) = call(
    &state,
    "POST",
    "/payments/upgrades/confirm",
    None,
    Some(signed(&fake, 1900, ConfirmationStatus::Completed)),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let row = state
    .store
    .get_upgrade(attempt_id(&upgrade))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(row.payment_status, PaymentStatus::Pending);
  let profile = state.store.get_profile(user_id).await.unwrap().unwrap();
  assert_eq!(profile.subscription_tier, Tier::Free);
}

// ─── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_writes_require_module_access() {
  let state = make_state().await;
  let (_, token) = login(&state, "learner@example.com").await;
  let c = course(&state, Tier::Free, 0).await;
  let m1 = state
    .store
    .add_module(c.course_id, NewModule::new(1, "M1", Tier::Free))
    .await
    .unwrap();
  state
    .store
    .add_module(c.course_id, NewModule::new(2, "M2", Tier::Free))
    .await
    .unwrap();
  let complete = format!("/modules/{}/complete", m1.module_id);

  let (status, _) = call(&state, "POST", &complete, None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let (status, body) = call(&state, "POST", &complete, Some(&token), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["kind"], "denied");

  buy(&state, &token, c.course_id, 0).await;

  let access = format!("/modules/{}/access", m1.module_id);
  let (status, body) = call(&state, "POST", &access, Some(&token), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["completed"], false);

  let (status, body) = call(&state, "POST", &complete, Some(&token), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["completed"], true);
  assert_eq!(body["progress_percentage"], 100);

  let (status, body) = call(
    &state,
    "GET",
    &format!("/courses/{}/progress", c.course_id),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "completed": 1, "total": 2, "percentage": 50 }));
}

#[tokio::test]
async fn unknown_module_is_404() {
  let state = make_state().await;
  let (_, token) = login(&state, "learner@example.com").await;
  let (status, _) = call(
    &state,
    "POST",
    &format!("/modules/{}/complete", Uuid::new_v4()),
    Some(&token),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Administration ───────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_endpoints_check_the_allow_list() {
  let state = make_state().await;
  let (_, learner) = login(&state, "learner@example.com").await;
  let (_, admin) = login(&state, ADMIN).await;
  let new_course = json!({ "title": "Rust", "required_tier": "basic", "price": 4900 });

  let (status, _) = call(&state, "POST", "/admin/courses", None, Some(new_course.clone())).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let (status, body) =
    call(&state, "POST", "/admin/courses", Some(&learner), Some(new_course.clone())).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["kind"], "denied");

  let (status, body) =
    call(&state, "POST", "/admin/courses", Some(&admin), Some(new_course)).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["required_tier"], "basic");
  let id = body["course_id"].as_str().unwrap().to_string();

  let module = json!({ "position": 1, "title": "Ownership", "required_tier": "basic" });
  let uri = format!("/admin/courses/{id}/modules");
  let (status, _) = call(&state, "POST", &uri, Some(&admin), Some(module.clone())).await;
  assert_eq!(status, StatusCode::CREATED);
  let (status, body) = call(&state, "POST", &uri, Some(&admin), Some(module)).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "conflict");
}

#[tokio::test]
async fn unknown_tier_in_admin_body_is_rejected() {
  let state = make_state().await;
  let (_, admin) = login(&state, ADMIN).await;
  let (status, _) = call(
    &state,
    "POST",
    "/admin/courses",
    Some(&admin),
    Some(json!({ "title": "X", "required_tier": "gold", "price": 1 })),
  )
  .await;
  assert!(status.is_client_error());
  assert!(state.store.list_courses(true).await.unwrap().is_empty());
}

#[tokio::test]
async fn inactive_courses_are_hidden_from_learners() {
  let state = make_state().await;
  let (_, learner) = login(&state, "learner@example.com").await;
  let (_, admin) = login(&state, ADMIN).await;
  let c = course(&state, Tier::Free, 0).await;

  let (status, body) = call(
    &state,
    "PUT",
    &format!("/admin/courses/{}/active", c.course_id),
    Some(&admin),
    Some(json!({ "is_active": false })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["is_active"], false);

  let uri = format!("/courses/{}", c.course_id);
  let (status, _) = call(&state, "GET", &uri, Some(&learner), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (status, _) = call(&state, "GET", &uri, Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);

  let (_, listed) = call(&state, "GET", "/courses", Some(&learner), None).await;
  assert_eq!(listed.as_array().unwrap().len(), 0);
  let (_, listed) = call(&state, "GET", "/courses", Some(&admin), None).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_tier_change_is_logged_for_the_user() {
  let state = make_state().await;
  let (user_id, learner) = login(&state, "learner@example.com").await;
  let (_, admin) = login(&state, ADMIN).await;

  let (status, body) = call(
    &state,
    "PUT",
    &format!("/admin/profiles/{user_id}/tier"),
    Some(&admin),
    Some(json!({ "tier": "premium" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["subscription_tier"], "premium");

  let (_, log) = call(&state, "GET", "/me/activity?limit=5", Some(&learner), None).await;
  assert_eq!(log[0]["kind"], "tier_upgrade");

  let (status, profiles) = call(&state, "GET", "/admin/profiles", Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(profiles.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn stats_are_admin_only_and_count_the_platform() {
  let state = make_state().await;
  let (_, learner) = login(&state, "learner@example.com").await;
  let (_, admin) = login(&state, ADMIN).await;

  let (status, _) = call(&state, "GET", "/admin/stats", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  let (status, _) = call(&state, "GET", "/admin/stats", Some(&learner), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let live = course(&state, Tier::Free, 0).await;
  let hidden = course(&state, Tier::Basic, 100).await;
  state.store.set_course_active(hidden.course_id, false).await.unwrap();
  for position in 1..=3 {
    state
      .store
      .add_module(live.course_id, NewModule::new(position, "Part", Tier::Free))
      .await
      .unwrap();
  }

  let (status, stats) = call(&state, "GET", "/admin/stats", Some(&admin), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(
    stats,
    json!({
      "total_students": 2,
      "total_courses":  2,
      "active_courses": 1,
      "total_modules":  3,
    })
  );
}
