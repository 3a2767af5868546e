use uuid::Uuid;

/// Produces object store keys for new uploads
#[cfg_attr(test, mockall::automock)]
pub trait KeyGenerator: Send + Sync {
    /// Generate a key that is unique for the lifetime of the bucket
    fn generate(&self, filename: &str) -> String;
}

/// Key generator producing `{uuid_v4}_{filename}`
///
/// The filename suffix exists for operators browsing the bucket; uniqueness
/// comes entirely from the UUID. The metadata store's unique constraint on
/// the key turns the improbable collision into an insert failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn generate(&self, filename: &str) -> String {
        format!("{}_{}", Uuid::new_v4(), sanitize_filename(filename))
    }
}

/// Sanitize a filename so it is safe as an object key suffix
fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}
