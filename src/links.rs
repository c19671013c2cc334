//! Personal referral link generation
//!
//! Every approved member gets a link of the form
//! `<site_root>/ref/<TOKEN>_<user_id>` where TOKEN is 8 random alphanumeric
//! characters. The user id suffix keeps the link attributable even if two
//! tokens ever collide.

use rand::Rng;

const TOKEN_LEN: usize = 8;
const TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a personal referral link for a user
pub fn generate(site_root: &str, user_id: &str) -> String {
    generate_with_rng(&mut rand::thread_rng(), site_root, user_id)
}

/// Same as [`generate`] but with a caller-supplied random source
pub fn generate_with_rng<R: Rng>(rng: &mut R, site_root: &str, user_id: &str) -> String {
    let token: String = (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect();

    format!(
        "{}/ref/{}_{}",
        site_root.trim_end_matches('/'),
        token,
        user_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn token_part(link: &str, user_id: &str) -> String {
        let tail = link.rsplit("/ref/").next().unwrap();
        let suffix = format!("_{}", user_id);
        assert!(tail.ends_with(&suffix), "link missing user id suffix: {}", link);
        tail[..tail.len() - suffix.len()].to_string()
    }

    #[test]
    fn test_link_format() {
        let mut rng = StdRng::seed_from_u64(7);
        let link = generate_with_rng(&mut rng, "https://slh-nft.com", "42");

        assert!(link.starts_with("https://slh-nft.com/ref/"));
        let token = token_part(&link, "42");
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_trailing_slash_on_root() {
        let mut rng = StdRng::seed_from_u64(7);
        let link = generate_with_rng(&mut rng, "https://slh-nft.com/", "42");
        assert!(link.starts_with("https://slh-nft.com/ref/"));
        assert!(!link.contains("//ref/"));
    }

    #[test]
    fn test_links_differ() {
        let a = generate("https://slh-nft.com", "42");
        let b = generate("https://slh-nft.com", "42");
        assert_ne!(a, b);
    }

    #[test]
    fn test_user_id_preserved_verbatim() {
        let mut rng = StdRng::seed_from_u64(1);
        let link = generate_with_rng(&mut rng, "https://slh-nft.com", "123456789");
        assert!(link.ends_with("_123456789"));
    }
}
