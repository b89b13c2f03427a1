//! Image URL rewriting for the CDN.
//!
//! Product images are stored as plain upload URLs. Catalog responses ask the
//! CDN for a resized, auto-format variant by inserting a transformation
//! segment after `/upload/`.

const UPLOAD_SEGMENT: &str = "/upload/";

pub fn optimized(url: &str, width: u32) -> String {
    let Some(idx) = url.find(UPLOAD_SEGMENT) else { return url.to_string() };
    let (head, tail) = url.split_at(idx + UPLOAD_SEGMENT.len());
    // Already transformed uploads start with a transformation segment like "w_400,..."
    if tail.starts_with("w_") || tail.starts_with("c_") || tail.starts_with("q_") { return url.to_string(); }
    format!("{}w_{},q_auto,f_auto/{}", head, width, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_upload_urls() {
        assert_eq!(
            optimized("https://res.cdn.com/demo/image/upload/v1/shoes/a.jpg", 400),
            "https://res.cdn.com/demo/image/upload/w_400,q_auto,f_auto/v1/shoes/a.jpg"
        );
    }

    #[test]
    fn test_leaves_other_urls_alone() {
        assert_eq!(optimized("https://example.com/a.jpg", 400), "https://example.com/a.jpg");
        let done = "https://res.cdn.com/image/upload/w_200,q_auto/a.jpg";
        assert_eq!(optimized(done, 400), done);
    }
}
