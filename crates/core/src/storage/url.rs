//! Public object URL synthesis.
//!
//! The rules mirror how S3-compatible backends address objects; a mismatch
//! here shows up as 403/404 on download.

use super::config::S3Settings;

/// Computes the externally visible URL of an object in an S3-family bucket.
///
/// Priority:
/// 1. `{public_base_url}/{key}`
/// 2. explicit endpoint: `https://{endpoint}/{bucket}/{key}` (path style) or
///    `https://{bucket}.{endpoint}/{key}`
/// 3. `https://{bucket}.s3.{region}.amazonaws.com/{key}`
#[must_use]
pub fn object_url(
    public_base_url: Option<&str>,
    endpoint: Option<&str>,
    force_path_style: bool,
    bucket: &str,
    region: &str,
    object_key: &str,
) -> String {
    if let Some(base) = public_base_url.filter(|base| !base.is_empty()) {
        return format!("{}/{object_key}", base.trim_end_matches('/'));
    }

    if let Some(endpoint) = endpoint.filter(|endpoint| !endpoint.is_empty()) {
        let host = strip_scheme(endpoint);
        return if force_path_style {
            format!("https://{host}/{bucket}/{object_key}")
        } else {
            format!("https://{bucket}.{host}/{object_key}")
        };
    }

    format!("https://{bucket}.s3.{region}.amazonaws.com/{object_key}")
}

fn strip_scheme(endpoint: &str) -> &str {
    endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest)
        .trim_end_matches('/')
}

impl S3Settings {
    /// Public URL of an object in this bucket.
    #[must_use]
    pub fn object_url(&self, object_key: &str) -> String {
        object_url(
            self.public_base_url.as_deref(),
            self.endpoint.as_deref(),
            self.force_path_style,
            &self.bucket,
            &self.region,
            object_key,
        )
    }
}

/// URL of an object written to the local filesystem backend.
#[must_use]
pub fn local_object_url(public_base_url: Option<&str>, object_key: &str) -> String {
    match public_base_url.filter(|base| !base.is_empty()) {
        Some(base) => format!("{}/{object_key}", base.trim_end_matches('/')),
        None => format!("/files/{object_key}"),
    }
}

/// URL of an object written to a WebDAV server.
#[must_use]
pub fn webdav_object_url(
    public_base_url: Option<&str>,
    endpoint: &str,
    root: &str,
    object_key: &str,
) -> String {
    if let Some(base) = public_base_url.filter(|base| !base.is_empty()) {
        return format!("{}/{object_key}", base.trim_end_matches('/'));
    }

    let root = root.trim_matches('/');
    let endpoint = endpoint.trim_end_matches('/');
    if root.is_empty() {
        format!("{endpoint}/{object_key}")
    } else {
        format!("{endpoint}/{root}/{object_key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, Some("minio:9000"), true, "https://minio:9000/b/p/f.zip")]
    #[case(None, Some("minio:9000"), false, "https://b.minio:9000/p/f.zip")]
    #[case(None, Some("http://minio:9000/"), true, "https://minio:9000/b/p/f.zip")]
    #[case(None, Some("https://oss-cn-hangzhou.aliyuncs.com"), false, "https://b.oss-cn-hangzhou.aliyuncs.com/p/f.zip")]
    #[case(None, None, false, "https://b.s3.r.amazonaws.com/p/f.zip")]
    #[case(None, None, true, "https://b.s3.r.amazonaws.com/p/f.zip")]
    #[case(Some("https://cdn.example.com/"), Some("minio:9000"), true, "https://cdn.example.com/p/f.zip")]
    #[case(Some(""), None, false, "https://b.s3.r.amazonaws.com/p/f.zip")]
    fn test_object_url(
        #[case] public_base_url: Option<&str>,
        #[case] endpoint: Option<&str>,
        #[case] force_path_style: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(
            object_url(public_base_url, endpoint, force_path_style, "b", "r", "p/f.zip"),
            expected
        );
    }

    #[test]
    fn test_settings_object_url() {
        let settings = S3Settings::new("b", "r")
            .with_endpoint("minio:9000")
            .with_path_style(true);
        assert_eq!(settings.object_url("p/f.zip"), "https://minio:9000/b/p/f.zip");
    }

    #[test]
    fn test_local_object_url() {
        assert_eq!(local_object_url(None, "p/f.zip"), "/files/p/f.zip");
        assert_eq!(
            local_object_url(Some("https://dl.example.com/"), "p/f.zip"),
            "https://dl.example.com/p/f.zip"
        );
    }

    #[test]
    fn test_webdav_object_url() {
        assert_eq!(
            webdav_object_url(None, "https://dav.example.com/", "/uploads/", "p/f.zip"),
            "https://dav.example.com/uploads/p/f.zip"
        );
        assert_eq!(
            webdav_object_url(None, "https://dav.example.com", "", "p/f.zip"),
            "https://dav.example.com/p/f.zip"
        );
    }
}
