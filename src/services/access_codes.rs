use rand::Rng;

/// Random six-digit apartment access code terminated with `#`.
pub fn generate_apartment_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{}#", rng.gen_range(100_000..=999_999))
}

#[cfg(test)]
mod tests {
    use super::generate_apartment_code;

    #[test]
    fn codes_are_six_digits_and_hash() {
        for _ in 0..50 {
            let code = generate_apartment_code();
            assert_eq!(code.len(), 7);
            assert!(code.ends_with('#'));
            assert!(code[..6].chars().all(|c| c.is_ascii_digit()));
            assert_ne!(&code[..1], "0");
        }
    }
}
