use crate::{
    config::Config,
    errors::ApiError,
    repository::UploadRepository,
    storage::MediaStorage,
    validation::{FILE_FIELD, FilePart, NON_FIELD_ERRORS, ValidationErrors, validate_upload},
};
use actix_multipart::{Multipart, MultipartError};
use actix_web::{HttpRequest, HttpResponse, http::header, web};
use chrono::{SubsecRound, Utc};
use futures_util::TryStreamExt as _;
use serde_json::Value;

pub async fn upload(
    cfg: web::Data<Config>,
    storage: web::Data<MediaStorage>,
    repo: web::Data<dyn UploadRepository>,
    req: HttpRequest,
    payload: web::Payload,
) -> Result<HttpResponse, ApiError> {
    let part = read_file_part(&req, payload, cfg.max_upload_size).await?;
    let valid = validate_upload(part, cfg.max_upload_size)?;

    let store = storage.clone();
    let file = web::block(move || store.save(&valid.name, &valid.data)).await??;

    let uploaded_at = Utc::now().trunc_subsecs(6);
    let record = match repo.create(&file, uploaded_at).await {
        Ok(record) => record,
        Err(e) => {
            // The row is gone, so the file must go too.
            let store = storage.clone();
            let orphan = file.clone();
            match web::block(move || store.delete(&orphan)).await {
                Ok(Ok(())) => {}
                Ok(Err(rm)) => log::error!("failed to remove orphaned upload {file}: {rm}"),
                Err(rm) => log::error!("failed to remove orphaned upload {file}: {rm}"),
            }
            return Err(e);
        }
    };

    log::info!("stored upload #{} at {}", record.id, record.file);
    Ok(HttpResponse::Created().json(record))
}

pub async fn method_not_allowed(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed(req.method().to_string()))
}

/// Body encodings the upload endpoint understands.
#[derive(Debug, PartialEq, Eq)]
enum BodyKind {
    Multipart,
    Json,
    UrlEncoded,
    /// No `Content-Type` at all; the body is not looked at.
    Empty,
}

fn body_kind(req: &HttpRequest) -> Result<BodyKind, ApiError> {
    let Some(value) = req.headers().get(header::CONTENT_TYPE) else {
        return Ok(BodyKind::Empty);
    };
    let raw = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
    let essence = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match essence.as_str() {
        "" => Ok(BodyKind::Empty),
        "multipart/form-data" => Ok(BodyKind::Multipart),
        "application/json" => Ok(BodyKind::Json),
        "application/x-www-form-urlencoded" => Ok(BodyKind::UrlEncoded),
        _ => Err(ApiError::UnsupportedMediaType(raw)),
    }
}

fn parse_error(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Multipart form parse error - {e}"))
}

/// Finds the `file` value in the body. Only multipart parts can carry a
/// filename; a `file` key in a JSON or urlencoded body is passed on without
/// one so validation reports it as not being a file.
async fn read_file_part(
    req: &HttpRequest,
    payload: web::Payload,
    max_upload_size: usize,
) -> Result<Option<FilePart>, ApiError> {
    match body_kind(req)? {
        BodyKind::Multipart => read_multipart_file(req, payload, max_upload_size).await,
        BodyKind::Json => json_file_part(&read_body(payload, max_upload_size).await?),
        BodyKind::UrlEncoded => form_file_part(&read_body(payload, max_upload_size).await?),
        BodyKind::Empty => Ok(None),
    }
}

async fn read_body(mut payload: web::Payload, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Request body read error - {e}")))?
    {
        body.extend_from_slice(&chunk);
        if body.len() > limit {
            return Err(ApiError::BadRequest(format!("Request body exceeds {limit} bytes.")));
        }
    }
    Ok(body)
}

fn text_part(value: String) -> FilePart {
    FilePart {
        filename: None,
        data: value.into_bytes(),
        exceeded_limit: false,
    }
}

fn json_file_part(body: &[u8]) -> Result<Option<FilePart>, ApiError> {
    if body.is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("JSON parse error - {e}")))?;
    let mut fields = match value {
        Value::Object(fields) => fields,
        other => {
            let got = json_type_name(&other);
            return Err(ValidationErrors::single(
                NON_FIELD_ERRORS,
                format!("Invalid data. Expected a dictionary, but got {got}."),
            )
            .into());
        }
    };
    match fields.remove(FILE_FIELD) {
        None => Ok(None),
        Some(Value::Null) => Err(ValidationErrors::single(FILE_FIELD, "This field may not be null.").into()),
        Some(Value::String(s)) => Ok(Some(text_part(s))),
        Some(other) => Ok(Some(text_part(other.to_string()))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn form_file_part(body: &[u8]) -> Result<Option<FilePart>, ApiError> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(body).map_err(|e| ApiError::BadRequest(format!("Form parse error - {e}")))?;
    Ok(pairs
        .into_iter()
        .rev()
        .find(|(key, _)| key == FILE_FIELD)
        .map(|(_, value)| text_part(value)))
}

/// Pulls the `file` part out of a multipart body. Other parts are drained
/// and ignored; if `file` appears more than once the last one wins.
async fn read_multipart_file(
    req: &HttpRequest,
    payload: web::Payload,
    max_upload_size: usize,
) -> Result<Option<FilePart>, ApiError> {
    let mut multipart = Multipart::new(req.headers(), payload);
    let mut found = None;
    while let Some(mut field) = multipart.try_next().await.map_err(parse_error)? {
        if field.name() != Some(FILE_FIELD) {
            while field.try_next().await.map_err(parse_error)?.is_some() {}
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let mut data: Vec<u8> = Vec::new();
        let mut exceeded_limit = false;
        while let Some(chunk) = field.try_next().await.map_err(parse_error)? {
            data.extend_from_slice(&chunk);
            if data.len() > max_upload_size {
                exceeded_limit = true;
                break;
            }
        }
        found = Some(FilePart {
            filename,
            data,
            exceeded_limit,
        });
        if exceeded_limit {
            break;
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn kind_of(content_type: &str) -> Result<BodyKind, ApiError> {
        body_kind(&TestRequest::default().insert_header((header::CONTENT_TYPE, content_type)).to_http_request())
    }

    #[test]
    fn classifies_content_types() {
        assert_eq!(kind_of("multipart/form-data; boundary=x").unwrap(), BodyKind::Multipart);
        assert_eq!(kind_of("application/json; charset=utf-8").unwrap(), BodyKind::Json);
        assert_eq!(kind_of("Application/X-WWW-Form-Urlencoded").unwrap(), BodyKind::UrlEncoded);
        assert_eq!(body_kind(&TestRequest::default().to_http_request()).unwrap(), BodyKind::Empty);
        assert!(matches!(kind_of("text/plain"), Err(ApiError::UnsupportedMediaType(t)) if t == "text/plain"));
    }

    #[test]
    fn json_file_key_is_not_a_file() {
        let part = json_file_part(br#"{"file": "hello.txt", "other": 1}"#).unwrap().unwrap();
        assert_eq!(part.filename, None);
        assert_eq!(part.data, b"hello.txt");

        assert!(json_file_part(br#"{"other": 1}"#).unwrap().is_none());
        assert!(json_file_part(b"").unwrap().is_none());
    }

    #[test]
    fn json_null_and_non_objects() {
        let Err(ApiError::Validation(errors)) = json_file_part(br#"{"file": null}"#) else {
            panic!("expected a validation error");
        };
        assert_eq!(errors.messages(FILE_FIELD), vec!["This field may not be null."]);

        let Err(ApiError::Validation(errors)) = json_file_part(b"[1, 2]") else {
            panic!("expected a validation error");
        };
        assert_eq!(
            errors.messages(NON_FIELD_ERRORS),
            vec!["Invalid data. Expected a dictionary, but got list."]
        );

        assert!(matches!(json_file_part(b"{not json"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn form_takes_last_file_value() {
        let part = form_file_part(b"file=a.txt&note=x&file=b.txt").unwrap().unwrap();
        assert_eq!(part.filename, None);
        assert_eq!(part.data, b"b.txt");
        assert!(form_file_part(b"note=x").unwrap().is_none());
    }
}
