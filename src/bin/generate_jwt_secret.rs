use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

/// 256 random bits, printed as base64 (for JWT_SECRET) and hex.
fn generate_secret() -> ([u8; 32], String, String) {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    let base64_key = STANDARD.encode(key);
    let hex_key = hex::encode(key);
    (key, base64_key, hex_key)
}

fn main() {
    println!("🔐 BuzAI JWT Secret Generator");
    println!("=============================");

    let (_, base64_key, hex_key) = generate_secret();

    println!();
    println!("Generated secure JWT secret key:");
    println!("Base64: {}", base64_key);
    println!("Hex:    {}", hex_key);
    println!();
    println!("📝 Copy this line to your .env file:");
    println!("JWT_SECRET={}", base64_key);
    println!();
    println!("Existing tokens stop verifying once the secret changes; users must log in again.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodings_match_key() {
        let (key, base64_key, hex_key) = generate_secret();
        assert_eq!(STANDARD.decode(&base64_key).unwrap(), key.to_vec());
        assert_eq!(hex_key.len(), 64);
        assert_eq!(hex::decode(&hex_key).unwrap(), key.to_vec());
    }
}
