use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{DetectFuture, GoogleHttp, TextAnnotation, TextDetector, Vertex};
use crate::error::PipelineError;

const SERVICE: &str = "vision";

/// Google Cloud Vision `images:annotate` client running `TEXT_DETECTION`.
#[derive(Clone)]
pub struct VisionClient {
    google: GoogleHttp,
    endpoint: String,
}

impl VisionClient {
    pub(crate) fn new(google: GoogleHttp, endpoint: String) -> Self {
        Self { google, endpoint }
    }
}

impl TextDetector for VisionClient {
    fn detect_text<'a>(&'a self, png: &'a [u8]) -> DetectFuture<'a> {
        Box::pin(async move {
            let body = json!({
                "requests": [
                    {
                        "image": { "content": BASE64.encode(png) },
                        "features": [ { "type": "TEXT_DETECTION" } ]
                    }
                ]
            });
            let text = self
                .google
                .post_json(SERVICE, &self.endpoint, &body, |message| {
                    PipelineError::Service {
                        service: SERVICE,
                        message,
                    }
                })
                .await?;
            let annotations = parse_annotate_response(&text)?;
            debug!("vision returned {} annotations", annotations.len());
            Ok(annotations)
        })
    }
}

/// Extracts the annotations of the single image in an `images:annotate`
/// response, preserving the service's order.
pub(crate) fn parse_annotate_response(text: &str) -> Result<Vec<TextAnnotation>, PipelineError> {
    let payload: AnnotateResponse = serde_json::from_str(text).map_err(|err| {
        PipelineError::Service {
            service: SERVICE,
            message: format!("failed to parse annotate response: {}", err),
        }
    })?;
    let Some(image) = payload.responses.into_iter().next() else {
        return Ok(Vec::new());
    };
    if let Some(status) = image.error {
        return Err(classify_status(status));
    }
    Ok(image
        .text_annotations
        .into_iter()
        .map(|annotation| TextAnnotation {
            description: annotation.description,
            locale: annotation.locale.filter(|value| !value.trim().is_empty()),
            bounding_poly: annotation
                .bounding_poly
                .map(|poly| poly.vertices)
                .unwrap_or_default(),
        })
        .collect())
}

// google.rpc.Code values that are worth retrying.
const CODE_RESOURCE_EXHAUSTED: i32 = 8;
const CODE_UNAVAILABLE: i32 = 14;
const CODE_DEADLINE_EXCEEDED: i32 = 4;

fn classify_status(status: RpcStatus) -> PipelineError {
    let message = status
        .message
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| format!("error code {}", status.code));
    match status.code {
        CODE_RESOURCE_EXHAUSTED | CODE_UNAVAILABLE | CODE_DEADLINE_EXCEEDED => {
            PipelineError::ServiceUnavailable {
                service: SERVICE,
                message,
            }
        }
        _ => PipelineError::Service {
            service: SERVICE,
            message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
struct AnnotateImageResponse {
    #[serde(rename = "textAnnotations", default)]
    text_annotations: Vec<EntityAnnotation>,
    error: Option<RpcStatus>,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
    locale: Option<String>,
    #[serde(rename = "boundingPoly")]
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    const RESPONSE: &str = r#"{
  "responses": [
    {
      "textAnnotations": [
        {
          "locale": "bn",
          "description": "হ্যালো বন্ধু\n",
          "boundingPoly": { "vertices": [ {"x": 4, "y": 2}, {"x": 90, "y": 2}, {"x": 90, "y": 30}, {"y": 30} ] }
        },
        {
          "description": "হ্যালো",
          "boundingPoly": { "vertices": [ {"x": 4, "y": 2}, {"x": 40, "y": 2}, {"x": 40, "y": 30}, {"x": 4, "y": 30} ] }
        },
        {
          "description": "বন্ধু",
          "boundingPoly": { "vertices": [ {"x": 50, "y": 2}, {"x": 90, "y": 2}, {"x": 90, "y": 30}, {"x": 50, "y": 30} ] }
        }
      ],
      "fullTextAnnotation": { "text": "হ্যালো বন্ধু\n" }
    }
  ]
}"#;

    #[test]
    fn keeps_service_order_and_whole_text_first() {
        let annotations = parse_annotate_response(RESPONSE).unwrap();
        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations[0].description, "হ্যালো বন্ধু\n");
        assert_eq!(annotations[0].locale.as_deref(), Some("bn"));
        assert_eq!(annotations[0].bounding_poly[3], Vertex { x: 0, y: 30 });
        assert_eq!(annotations[2].description, "বন্ধু");
    }

    #[test]
    fn bounding_poly_snapshot() {
        let annotations = parse_annotate_response(RESPONSE).unwrap();
        assert_json_snapshot!(annotations[1].bounding_poly, @r###"
        [
          {
            "x": 4,
            "y": 2
          },
          {
            "x": 40,
            "y": 2
          },
          {
            "x": 40,
            "y": 30
          },
          {
            "x": 4,
            "y": 30
          }
        ]
        "###);
    }

    #[test]
    fn image_without_text_yields_no_annotations() {
        assert!(parse_annotate_response(r#"{"responses":[{}]}"#).unwrap().is_empty());
        assert!(parse_annotate_response(r#"{"responses":[]}"#).unwrap().is_empty());
        assert!(parse_annotate_response("{}").unwrap().is_empty());
    }

    #[test]
    fn per_image_errors_are_classified() {
        let err = parse_annotate_response(
            r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Service { .. }));
        assert!(!err.is_retryable());

        let err = parse_annotate_response(
            r#"{"responses":[{"error":{"code":14,"message":"Service unavailable"}}]}"#,
        )
        .unwrap_err();
        assert!(err.is_retryable());
    }
}
