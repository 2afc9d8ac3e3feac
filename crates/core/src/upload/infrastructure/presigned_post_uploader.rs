use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;

use crate::shared::constants::UPLOAD_TIMEOUT;
use crate::upload::domain::upload_adapter::{UploadAdapter, UploadDestination, UploadError};

/// Multipart field that carries the image; storage services expect it last.
const FILE_FIELD: &str = "file";
const FILE_NAME: &str = "capture.jpg";

/// Uploads to a pre-authorized form-POST destination (S3-style presigned
/// POST): every destination field is sent verbatim, followed by the file.
pub struct PresignedPostUploader {
    client: Client,
}

impl PresignedPostUploader {
    pub fn new() -> Result<Self, UploadError> {
        Self::with_timeout(UPLOAD_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    fn form(blob: &[u8], content_type: &str, destination: &UploadDestination) -> Result<Form, UploadError> {
        let file = Part::bytes(blob.to_vec())
            .file_name(FILE_NAME)
            .mime_str(content_type)
            .map_err(|e| UploadError::InvalidRequest(e.to_string()))?;
        let form = destination
            .fields
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            });
        Ok(form.part(FILE_FIELD, file))
    }
}

impl UploadAdapter for PresignedPostUploader {
    fn upload(
        &self,
        blob: &[u8],
        content_type: &str,
        destination: &UploadDestination,
    ) -> Result<(), UploadError> {
        let form = Self::form(blob, content_type, destination)?;
        log::debug!(
            "Uploading {} bytes ({content_type}) to {}",
            blob.len(),
            destination.url
        );

        let response = self
            .client
            .post(&destination.url)
            .multipart(form)
            .send()
            .map_err(|e| {
                if e.is_builder() {
                    UploadError::InvalidRequest(e.to_string())
                } else {
                    UploadError::Network {
                        url: destination.url.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status {
                url: destination.url.clone(),
                status: status.as_u16(),
            });
        }
        log::info!("Upload accepted by {} ({status})", destination.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Accepts one request, answers with `status_line`, and hands back the
    /// raw request bytes.
    fn one_shot_server(status_line: &'static str) -> (String, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/upload", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // Multipart bodies end with the closing boundary `--\r\n`.
            while !request.ends_with(b"--\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response =
                format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            stream.write_all(response.as_bytes()).unwrap();
            request
        });
        (url, handle)
    }

    fn destination(url: &str) -> UploadDestination {
        UploadDestination::new(url)
            .with_field("key", "sessions/42/face.jpg")
            .with_field("policy", "eyJleHAiOiIyMDMwIn0=")
    }

    #[test]
    fn test_success_sends_fields_before_file() {
        let (url, server) = one_shot_server("204 No Content");
        let uploader = PresignedPostUploader::new().unwrap();

        let result = uploader.upload(b"\xFF\xD8jpeg-bytes", "image/jpeg", &destination(&url));
        assert!(result.is_ok(), "{result:?}");

        let request = String::from_utf8_lossy(&server.join().unwrap()).into_owned();
        assert!(request.starts_with("POST /upload"));
        let key = request.find("name=\"key\"").unwrap();
        let policy = request.find("name=\"policy\"").unwrap();
        let file = request.find("name=\"file\"").unwrap();
        assert!(key < policy && policy < file);
        assert!(request.contains("sessions/42/face.jpg"));
        assert!(request.contains("Content-Type: image/jpeg"));
        assert!(request.contains("filename=\"capture.jpg\""));
    }

    #[test]
    fn test_rejected_status_maps_to_status_error() {
        let (url, server) = one_shot_server("403 Forbidden");
        let uploader = PresignedPostUploader::new().unwrap();

        let err = uploader
            .upload(b"jpeg", "image/jpeg", &destination(&url))
            .unwrap_err();
        server.join().unwrap();
        match err {
            UploadError::Status { status, url: failed } => {
                assert_eq!(status, 403);
                assert_eq!(failed, url);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn test_unreachable_host_maps_to_network_error() {
        // Bind then drop to get a port nothing listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let uploader = PresignedPostUploader::with_timeout(Duration::from_secs(2)).unwrap();
        let err = uploader
            .upload(
                b"jpeg",
                "image/jpeg",
                &UploadDestination::new(format!("http://127.0.0.1:{port}/")),
            )
            .unwrap_err();
        assert!(matches!(err, UploadError::Network { .. }), "{err:?}");
    }

    #[test]
    fn test_bad_content_type_is_invalid_request() {
        let uploader = PresignedPostUploader::new().unwrap();
        let err = uploader
            .upload(b"jpeg", "not a mime", &UploadDestination::new("http://127.0.0.1:9/"))
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidRequest(_)), "{err:?}");
    }
}
