//! Router

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::admin;
use crate::handlers::{
    authenticate, create_customer_and_subscribe, create_payment_intent, forgot_password,
    get_widget, health_check, is_authenticated, payment_succeeded, reset_password,
    verify_reset_link,
};
use crate::state::AppState;
use crate::ws::ws_endpoint;

/// All routes, without the CORS and trace layers
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/virtual-terminal-succeeded", post(admin::virtual_terminal_succeeded))
        .route("/all-sales", post(admin::all_sales))
        .route("/all-subscriptions", post(admin::all_subscriptions))
        .route("/get-sale/{id}", post(admin::get_sale))
        .route("/refund", post(admin::refund))
        .route("/cancel-subscription", post(admin::cancel_subscription))
        .route("/all-users", post(admin::all_users))
        .route("/all-users/{id}", post(admin::get_user))
        .route("/all-users/edit/{id}", post(admin::edit_user))
        .route("/all-users/delete/{id}", post(admin::delete_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin,
        ));

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Storefront
        .route("/api/payment-intent", post(create_payment_intent))
        .route("/api/widget/{id}", get(get_widget))
        .route("/api/create-customer-and-subscribe-to-plan", post(create_customer_and_subscribe))
        .route("/api/payment-succeeded", post(payment_succeeded))

        // Accounts
        .route("/api/authenticate", post(authenticate))
        .route("/api/is-authenticated", post(is_authenticated))
        .route("/api/forgot-password", post(forgot_password))
        .route("/api/verify-reset-link", post(verify_reset_link))
        .route("/api/reset-password", post(reset_password))

        // Notifications
        .route("/ws", get(ws_endpoint))

        .nest("/api/admin", admin_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{
            Method, Request, StatusCode,
            header::{AUTHORIZATION, CONTENT_TYPE},
        },
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use widget_auth::{AuthConfig, Authenticator, hash_password};
    use widget_core::{MemoryStore, NewUser, UserStore, Widget};
    use widget_hub::{ClientSink, DEFAULT_EVENT_CAPACITY, Hub, Notice};
    use widget_payments::{
        CardDetails, CommitPipeline, GatewayCustomer, GatewaySubscription, Invoice, InvoiceSink,
        PaymentGateway, PaymentIntentDetails, PaymentIntentSummary, RefundReceipt,
    };

    use super::*;
    use crate::config::ServerConfig;
    use crate::mailer::{Mail, MailError, Mailer, Template};

    const SECRET: &str = "abcdefghijklmnopqrstuvwxyz012345";

    struct FakeGateway;

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_payment_intent(
            &self,
            currency: &str,
            amount: i64,
        ) -> widget_payments::Result<PaymentIntentSummary> {
            Ok(PaymentIntentSummary {
                id: "pi_test".into(),
                client_secret: Some("pi_test_secret".into()),
                amount,
                currency: currency.into(),
                status: "requires_payment_method".into(),
            })
        }

        async fn payment_intent(&self, id: &str) -> widget_payments::Result<PaymentIntentDetails> {
            Ok(PaymentIntentDetails {
                id: id.into(),
                amount: 1000,
                currency: "usd".into(),
                status: "succeeded".into(),
                latest_charge: Some("ch_test".into()),
            })
        }

        async fn payment_method(&self, id: &str) -> widget_payments::Result<CardDetails> {
            Ok(CardDetails {
                payment_method: id.into(),
                last_four: "4242".into(),
                expiry_month: 1,
                expiry_year: 2031,
                brand: "visa".into(),
            })
        }

        async fn create_customer(
            &self,
            _pm: &str,
            _email: &str,
        ) -> widget_payments::Result<GatewayCustomer> {
            Ok(GatewayCustomer { id: "cus_test".into() })
        }

        async fn subscribe(
            &self,
            _customer: &GatewayCustomer,
            _plan: &str,
            _pm: &str,
            _last_four: &str,
        ) -> widget_payments::Result<GatewaySubscription> {
            Ok(GatewaySubscription {
                id: "sub_test".into(),
                status: "active".into(),
            })
        }

        async fn cancel_subscription(&self, _id: &str) -> widget_payments::Result<()> {
            Ok(())
        }

        async fn refund(&self, _pi: &str, _amount: i64) -> widget_payments::Result<RefundReceipt> {
            Ok(RefundReceipt { id: "re_test".into() })
        }
    }

    struct NoInvoices;

    impl InvoiceSink for NoInvoices {
        fn dispatch(&self, _invoice: Invoice) {}
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<Mail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: Mail) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(mail);
            Ok(())
        }
    }

    struct CapturingSink(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl ClientSink for CapturingSink {
        async fn send_text(&mut self, text: String) -> widget_hub::Result<()> {
            self.0.lock().unwrap().push(text);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    struct TestApp {
        state: AppState,
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
    }

    async fn test_app(with_payments: bool) -> TestApp {
        let store = Arc::new(MemoryStore::with_widgets([Widget {
            id: 1,
            name: "Triplex Widget".into(),
            price: 1000,
            ..Widget::default()
        }]));
        store
            .add_user(
                NewUser {
                    first_name: "Ada".into(),
                    last_name: "Admin".into(),
                    email: "admin@example.com".into(),
                },
                &hash_password("password").unwrap(),
            )
            .await
            .unwrap();

        let auth =
            Authenticator::new(store.clone(), store.clone(), AuthConfig::new(SECRET)).unwrap();
        let (hub, worker) = Hub::new(DEFAULT_EVENT_CAPACITY);
        tokio::spawn(worker.run());

        let payments = with_payments.then(|| {
            Arc::new(CommitPipeline::new(
                Arc::new(FakeGateway),
                store.clone(),
                Arc::new(NoInvoices),
                Duration::from_secs(1),
            ))
        });
        let mailer = Arc::new(RecordingMailer::default());

        let state = AppState {
            orders: store.clone(),
            users: store.clone(),
            auth: Arc::new(auth),
            payments,
            publishable_key: None,
            hub,
            mailer: mailer.clone(),
            config: Arc::new(ServerConfig::default()),
        };
        TestApp {
            state,
            store,
            mailer,
        }
    }

    impl TestApp {
        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Value,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method(method)
                .uri(uri)
                .header(CONTENT_TYPE, "application/json");
            if let Some(token) = token {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = builder.body(Body::from(body.to_string())).unwrap();

            let response = router(self.state.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }

        async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.call(Method::POST, uri, token, body).await
        }

        async fn login(&self) -> String {
            let (status, body) = self
                .post(
                    "/api/authenticate",
                    None,
                    json!({"email": "admin@example.com", "password": "password"}),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            body["authentication_token"]["token"]
                .as_str()
                .unwrap()
                .to_string()
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(true).await;
        let (status, body) = app.call(Method::GET, "/health", None, Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["payments_configured"], true);
    }

    #[tokio::test]
    async fn test_get_widget() {
        let app = test_app(true).await;
        let (status, body) = app.call(Method::GET, "/api/widget/1", None, Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Triplex Widget");

        let (status, body) = app.call(Method::GET, "/api/widget/99", None, Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let app = test_app(true).await;
        for token in [None, Some("AAAAAAAAAAAAAAAAAAAAAAAAAA"), Some("short")] {
            let (status, body) = app
                .post("/api/admin/all-sales", token, json!({"page_size": 10, "page": 1}))
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(
                body,
                json!({"error": "invalid credentials", "code": "INVALID_CREDENTIALS"})
            );
        }
    }

    #[tokio::test]
    async fn test_bad_login_is_generic() {
        let app = test_app(true).await;
        let (status, body) = app
            .post(
                "/api/authenticate",
                None,
                json!({"email": "admin@example.com", "password": "wrong"}),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid credentials");
    }

    #[tokio::test]
    async fn test_is_authenticated() {
        let app = test_app(true).await;
        let token = app.login().await;
        let (status, body) = app.post("/api/is-authenticated", Some(&token), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "authenticated user admin@example.com");
    }

    #[tokio::test]
    async fn test_payment_intent() {
        let app = test_app(true).await;
        let (status, body) = app
            .post("/api/payment-intent", None, json!({"currency": "usd", "amount": "1999"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["amount"], 1999);
        assert_eq!(body["client_secret"], "pi_test_secret");
    }

    #[tokio::test]
    async fn test_payments_disabled_without_gateway() {
        let app = test_app(false).await;
        let (status, body) = app
            .post("/api/payment-intent", None, json!({"currency": "usd", "amount": 1999}))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "PAYMENTS_DISABLED");
    }

    #[tokio::test]
    async fn test_purchase_then_admin_sale_and_refund() {
        let app = test_app(true).await;
        let (status, body) = app
            .post(
                "/api/payment-succeeded",
                None,
                json!({
                    "product_id": "1",
                    "payment_intent": "pi_abc",
                    "payment_method": "pm_abc",
                    "first_name": "Ann",
                    "last_name": "Lee",
                    "email": "ann@example.com"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Transaction successful");
        let order_id = body["id"].as_i64().unwrap();

        let token = app.login().await;
        let (status, sale) = app
            .post(&format!("/api/admin/get-sale/{order_id}"), Some(&token), Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sale["transaction"]["last_four"], "4242");
        assert_eq!(sale["customer"]["email"], "ann@example.com");

        let (status, page) = app
            .post("/api/admin/all-sales", Some(&token), json!({"page_size": 10, "page": 1}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total_records"], 1);

        let (status, body) = app
            .post(
                "/api/admin/refund",
                Some(&token),
                json!({"id": order_id, "pi": "pi_abc", "amount": 1000, "currency": "usd"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Charge refunded");
    }

    #[tokio::test]
    async fn test_password_reset_round_trip() {
        let app = test_app(true).await;

        let (status, body) = app
            .post("/api/forgot-password", None, json!({"email": "ghost@example.com"}))
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["error"], true);
        assert!(app.mailer.sent.lock().unwrap().is_empty());

        let (status, _) = app
            .post("/api/forgot-password", None, json!({"email": "admin@example.com"}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let mail = app.mailer.sent.lock().unwrap()[0].clone();
        assert_eq!(mail.template.name(), "password-reset");
        let Template::PasswordReset { link } = mail.template;

        let (status, body) = app
            .post("/api/verify-reset-link", None, json!({"url": link}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let encrypted = body["email"].as_str().unwrap().to_string();

        let (status, _) = app
            .post(
                "/api/reset-password",
                None,
                json!({"email": encrypted, "password": "new-password"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = app
            .post(
                "/api/authenticate",
                None,
                json!({"email": "admin@example.com", "password": "new-password"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let forged = format!("{link}0");
        let (status, _) = app
            .post("/api/verify-reset-link", None, json!({"url": forged}))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_user_logs_out_connected_clients() {
        let app = test_app(true).await;
        let token = app.login().await;

        let (status, _) = app
            .post(
                "/api/admin/all-users/edit/0",
                Some(&token),
                json!({"first_name": "Bo", "last_name": "Clerk", "email": "bo@example.com", "password": "secret"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let bo = app.store.get_user_by_email("bo@example.com").await.unwrap();

        let outbox = Arc::new(Mutex::new(Vec::new()));
        app.state
            .hub
            .register(Box::new(CapturingSink(outbox.clone())))
            .await
            .unwrap();

        let (status, _) = app
            .post(&format!("/api/admin/all-users/delete/{}", bo.id), Some(&token), Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);

        let expected = serde_json::to_string(&Notice::logout(bo.id)).unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !outbox.lock().unwrap().contains(&expected) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(app.store.get_user(bo.id).await.is_err());
    }
}
