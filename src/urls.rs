use url::{ParseError, Url};
use uuid::Uuid;

/// Convenience wrapper for generating links sent to users.
#[derive(Clone, Debug)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,
}

impl Urls {
    pub fn new(base: impl AsRef<str>) -> Result<Self, ParseError> {
        let mut base = Url::parse(base.as_ref())?;

        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Urls { base })
    }

    /// The page where a password reset token is redeemed.
    pub fn reset_password(&self, token: &Uuid) -> Result<Url, ParseError> {
        self.base.join(&format!("reset_password/{}", token))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::Urls;

    #[test]
    fn reset_links_keep_the_base_path() {
        let token = Uuid::nil();

        for base in &["https://bank.example/app", "https://bank.example/app/"] {
            let urls = Urls::new(base).unwrap();

            assert_eq!(
                urls.reset_password(&token).unwrap().as_str(),
                "https://bank.example/app/reset_password/00000000-0000-0000-0000-000000000000"
            );
        }
    }
}
