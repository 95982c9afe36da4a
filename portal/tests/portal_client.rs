use std::collections::HashMap;
use std::time::Duration;

use portal::extractor::extract_transcript;
use portal::{AcademicPeriod, PortalClient, PortalConfig, PortalError, Stage};
use reqwest::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const FORM_PAGE: &str = r#"<html><form><input type="hidden" name="__VIEWSTATE" value="dDw0NTY3OTg=" />
<input type="hidden" name="__VIEWSTATEGENERATOR" value="17EB693E" /></form></html>"#;

const RESULT_PAGE: &str = r#"<html><input type="hidden" name="__VIEWSTATE" value="next" />
<table class="datelist" id="DataGrid1">
<tr class="datelisthead"><td>学年</td><td>课程名称</td></tr>
<tr><td>2021</td><td>高等数学</td><td>必修</td><td>91</td><td>A</td><td>-</td><td>0</td><td>0</td><td>4.0</td></tr>
<tr class="alt"><td>2021</td><td>大学物理</td><td>必修</td><td>66</td><td>D</td><td>-</td><td>0</td><td>1</td><td>3.0</td></tr>
</table></html>"#;

fn client_for(server: &MockServer, timeout: Duration) -> PortalClient {
    PortalClient::new(&PortalConfig {
        base_url: server.uri(),
        timeout,
    })
    .unwrap()
}

fn form_fields(req: &Request) -> HashMap<String, String> {
    let body = String::from_utf8_lossy(&req.body);
    Url::parse(&format!("http://form.local/?{body}"))
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

#[tokio::test]
async fn two_step_postback_returns_result_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/xscj.aspx"))
        .and(query_param("xh", "2021001"))
        .and(header("cookie", "ASP.NET_SessionId=sess"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FORM_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/xscj.aspx"))
        .and(header("cookie", "ASP.NET_SessionId=sess"))
        .and(|req: &Request| {
            let f = form_fields(req);
            f.get("__VIEWSTATE").map(String::as_str) == Some("dDw0NTY3OTg=")
                && f.get("__VIEWSTATEGENERATOR").map(String::as_str) == Some("17EB693E")
                && f.get("ddlXN").map(String::as_str) == Some("2021")
                && f.get("ddlXQ").map(String::as_str) == Some("1")
                && f.get("txtQSCJ").map(String::as_str) == Some("0")
                && f.get("txtZZCJ").map(String::as_str) == Some("100")
                && f.get("Button1").map(String::as_str) == Some("按学期查询")
        })
        .respond_with(ResponseTemplate::new(200).set_body_string(RESULT_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let body = client
        .fetch_transcript("2021001", &AcademicPeriod::new("2021", 1), "sess")
        .await
        .unwrap();

    let transcript = extract_transcript(&body).unwrap();
    assert_eq!(transcript.current.len(), 2);
    assert_eq!(transcript.current[1].name, "大学物理");
    assert_eq!(transcript.current[1].rebuild, "1");
    assert!(transcript.failed.is_empty());
}

#[tokio::test]
async fn whole_year_query_uses_year_caption() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FORM_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(|req: &Request| {
            form_fields(req).get("Button1").map(String::as_str) == Some("按学年查询")
        })
        .respond_with(ResponseTemplate::new(200).set_body_string(RESULT_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    client
        .fetch_transcript("2021001", &AcademicPeriod::new("2021", 0), "sess")
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_token_on_get_stops_before_post() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let err = client
        .fetch_transcript("2021001", &AcademicPeriod::all(), "stale")
        .await
        .unwrap_err();

    assert!(matches!(err, PortalError::MissingViewState { stage: Stage::Get }));
    assert!(!err.is_infrastructure());
}

#[tokio::test]
async fn missing_token_on_post_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FORM_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let err = client
        .fetch_transcript("2021001", &AcademicPeriod::all(), "sess")
        .await
        .unwrap_err();

    assert!(matches!(err, PortalError::MissingViewState { stage: Stage::Post }));
}

#[tokio::test]
async fn redirect_is_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/xscj.aspx"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/default2.aspx"),
        )
        .mount(&server)
        .await;
    Mock::given(path("/default2.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FORM_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let err = client
        .fetch_transcript("2021001", &AcademicPeriod::all(), "expired")
        .await
        .unwrap_err();

    match err {
        PortalError::Redirected { stage, location } => {
            assert_eq!(stage, Stage::Get);
            assert_eq!(location, "/default2.aspx");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_upstream_hits_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FORM_PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(200));
    let err = client.fetch_exam_schedule("2021001", "sess").await.unwrap_err();

    assert!(matches!(err, PortalError::Network(_)));
    assert!(err.is_infrastructure());
}

#[tokio::test]
async fn exam_schedule_is_a_single_get() {
    let server = MockServer::start().await;
    let page = r#"<input name="__VIEWSTATE" value="v" /><table id="DataGrid1">
<tr><td>1</td><td>数据结构</td><td>x</td><td>2021-06-20 09:00</td><td>B204</td><td>y</td><td>12</td></tr>
</table>"#;
    Mock::given(method("GET"))
        .and(path("/xskscx.aspx"))
        .and(query_param("xh", "2021001"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let body = client.fetch_exam_schedule("2021001", "sess").await.unwrap();
    let exams = portal::extractor::extract_exams(&body).unwrap();

    assert_eq!(exams.len(), 1);
    assert_eq!(exams[0].location, "B204");
    assert_eq!(exams[0].seat_number, "12");
}

#[tokio::test]
async fn server_error_is_infrastructure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let err = client.fetch_exam_schedule("2021001", "sess").await.unwrap_err();
    assert!(matches!(err, PortalError::Status { status: 503, stage: Stage::Get }));
    assert!(err.is_infrastructure());
}
