//! HTTP submitter behavior against a mock submission endpoint.

use std::time::{Duration, Instant};

use quizloop::core::types::Answer;
use quizloop::io::config::{QuizConfig, SubmitConfig};
use quizloop::io::submitter::{HttpSubmitter, SubmitError, SubmitRequest, Submitter};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUIZ_URL: &str = "https://quiz.example/q1";

fn submitter(server: &MockServer, retries: u32) -> HttpSubmitter {
    let config = QuizConfig {
        email: "me@example.com".to_string(),
        secret: "s3cret".to_string(),
        submit: SubmitConfig {
            url: format!("{}/submit", server.uri()),
            retries,
            retry_delay_ms: 0,
            timeout_secs: 5,
        },
        ..QuizConfig::default()
    };
    HttpSubmitter::new(&config).expect("submitter")
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(30)
}

#[tokio::test]
async fn posts_identity_url_and_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_json(json!({
            "email": "me@example.com",
            "secret": "s3cret",
            "url": QUIZ_URL,
            "answer": 42
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "correct": true,
            "url": "https://quiz.example/q2",
            "reason": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = Answer::from(42);
    let feedback = submitter(&server, 3)
        .submit(&SubmitRequest {
            url: QUIZ_URL,
            answer: &answer,
            deadline: far_deadline(),
        })
        .await
        .expect("submit");

    assert!(feedback.correct);
    assert_eq!(feedback.next_url(), Some("https://quiz.example/q2"));
}

#[tokio::test]
async fn incorrect_answer_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "correct": false,
            "reason": "Expected a number"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = Answer::from("abc");
    let feedback = submitter(&server, 3)
        .submit(&SubmitRequest {
            url: QUIZ_URL,
            answer: &answer,
            deadline: far_deadline(),
        })
        .await
        .expect("submit");

    assert!(!feedback.correct);
    assert_eq!(feedback.reason.as_deref(), Some("Expected a number"));
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(3)
        .mount(&server)
        .await;

    let answer = Answer::from(1);
    let err = submitter(&server, 3)
        .submit(&SubmitRequest {
            url: QUIZ_URL,
            answer: &answer,
            deadline: far_deadline(),
        })
        .await
        .unwrap_err();

    match err {
        SubmitError::Transport { attempts, message } => {
            assert_eq!(attempts, 3);
            assert!(message.contains("502"), "{message}");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn recovers_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "correct": true })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = Answer::from(1);
    let feedback = submitter(&server, 3)
        .submit(&SubmitRequest {
            url: QUIZ_URL,
            answer: &answer,
            deadline: far_deadline(),
        })
        .await
        .expect("submit");

    assert!(feedback.correct);
    assert_eq!(feedback.next_url(), None);
}

#[tokio::test]
async fn schema_invalid_body_counts_as_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(2)
        .mount(&server)
        .await;

    let answer = Answer::from(1);
    let err = submitter(&server, 2)
        .submit(&SubmitRequest {
            url: QUIZ_URL,
            answer: &answer,
            deadline: far_deadline(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SubmitError::Transport { attempts: 2, .. }));
}

#[tokio::test]
async fn expired_deadline_aborts_before_any_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "correct": true })))
        .expect(0)
        .mount(&server)
        .await;

    let answer = Answer::from(1);
    let err = submitter(&server, 3)
        .submit(&SubmitRequest {
            url: QUIZ_URL,
            answer: &answer,
            deadline: Instant::now(),
        })
        .await
        .unwrap_err();

    assert_eq!(err, SubmitError::TimeExceeded { attempts: 0 });
}

#[tokio::test]
async fn deadline_passing_during_retry_delay_stops_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = QuizConfig {
        submit: SubmitConfig {
            url: format!("{}/submit", server.uri()),
            retries: 3,
            retry_delay_ms: 800,
            timeout_secs: 5,
        },
        ..QuizConfig::default()
    };
    let answer = Answer::from(1);
    let err = HttpSubmitter::new(&config)
        .expect("submitter")
        .submit(&SubmitRequest {
            url: QUIZ_URL,
            answer: &answer,
            deadline: Instant::now() + Duration::from_millis(400),
        })
        .await
        .unwrap_err();

    assert_eq!(err, SubmitError::TimeExceeded { attempts: 1 });
}
