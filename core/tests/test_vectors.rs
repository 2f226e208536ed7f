//! Verify build/parse methods against JSON test vectors stored in `test-vectors/`.
//!
//! `requests.json` pairs operation inputs with the exact request the client
//! must build. `responses.json` pairs simulated responses with the parsed
//! value or the error kind. Comparing parsed JSON (not raw strings) avoids
//! false negatives from field-ordering differences.

use ecomarket_core::{
    ApiError, EcoMarketClient, HttpMethod, HttpRequest, HttpResponse, NewProduct, ProductFilter,
    ProductPatch, ResourceId,
};
use serde::Serialize;
use serde_json::Value;

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn id(input: &Value) -> ResourceId {
    input["id"].as_str().unwrap().parse().unwrap()
}

fn text(input: &Value, field: &str) -> Option<String> {
    input[field].as_str().map(str::to_string)
}

fn build(client: &EcoMarketClient, operation: &str, input: &Value) -> HttpRequest {
    let built = match operation {
        "list_products" => client.build_list_products(&ProductFilter {
            categoria: text(input, "categoria"),
            orden: text(input, "orden"),
        }),
        "get_product" => client.build_get_product(id(input)),
        "create_product" => {
            let product: NewProduct = serde_json::from_value(input.clone()).unwrap();
            client.build_create_product(&product)
        }
        "replace_product" => {
            let product: NewProduct = serde_json::from_value(input["product"].clone()).unwrap();
            client.build_replace_product(id(input), &product)
        }
        "patch_product" => {
            let patch: ProductPatch = serde_json::from_value(input["patch"].clone()).unwrap();
            client.build_patch_product(id(input), &patch)
        }
        "delete_product" => client.build_delete_product(id(input)),
        "get_profile" => match text(input, "token") {
            Some(token) => client.clone().with_token(token).build_get_profile(),
            None => client.build_get_profile(),
        },
        other => panic!("unknown operation: {other}"),
    };
    built.unwrap()
}

#[test]
fn request_vectors() {
    let raw = include_str!("../../test-vectors/requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let base = vectors["base_url"].as_str().unwrap();
    let client = EcoMarketClient::new(base).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected = &case["expected_request"];
        let req = build(&client, case["operation"].as_str().unwrap(), &case["input"]);

        assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, format!("{base}{}", expected["path"].as_str().unwrap()), "{name}: path");

        let expected_headers: Vec<(String, String)> = expected["headers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| {
                let arr = h.as_array().unwrap();
                (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
            })
            .collect();
        assert_eq!(req.headers, expected_headers, "{name}: headers");

        match req.body.as_deref() {
            Some(body) => {
                let body: Value = serde_json::from_str(body).unwrap();
                assert_eq!(body, expected["body"], "{name}: body");
            }
            None => assert!(expected["body"].is_null(), "{name}: expected a body"),
        }
    }
}

fn outcome<T: Serialize>(result: Result<T, ApiError>) -> Result<Value, String> {
    result
        .map(|v| serde_json::to_value(v).unwrap())
        .map_err(|e| e.kind().to_string())
}

fn parse(client: &EcoMarketClient, operation: &str, response: HttpResponse) -> Result<Value, String> {
    match operation {
        "list_products" => outcome(client.parse_list_products(response)),
        "get_product" => outcome(client.parse_get_product(response)),
        "create_product" => outcome(client.parse_create_product(response)),
        "delete_product" => outcome(client.parse_delete_product(response)),
        "list_categories" => outcome(client.parse_list_categories(response)),
        "get_profile" => outcome(client.parse_get_profile(response)),
        "list_notifications" => outcome(client.parse_list_notifications(response)),
        other => panic!("unknown operation: {other}"),
    }
}

#[test]
fn response_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let client = EcoMarketClient::new("http://localhost:3000").unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let simulated = &case["response"];
        let headers = simulated["content_type"]
            .as_str()
            .map(|ct| vec![("content-type".to_string(), ct.to_string())])
            .unwrap_or_default();
        let response = HttpResponse {
            status: simulated["status"].as_u64().unwrap() as u16,
            headers,
            body: simulated["body"].as_str().unwrap().to_string(),
        };

        let got = parse(&client, case["operation"].as_str().unwrap(), response);
        let expected = &case["expected"];
        match expected.get("error") {
            Some(kind) => assert_eq!(got, Err(kind.as_str().unwrap().to_string()), "{name}"),
            None => assert_eq!(got, Ok(expected["ok"].clone()), "{name}"),
        }
    }
}
