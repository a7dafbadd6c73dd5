/// Jenkins' one-at-a-time hash, matching the original `jnkHsh` used by
/// `shared/Helpers.cpp::hashForDevice`.
fn jenkins_one_at_a_time(data: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &byte in data {
        hash = hash.wrapping_add(u32::from(byte));
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}

/// Derive a device's stable hash identity from its address and port,
/// matching `hashForDevice`: hash `address || decimal(port)` and render
/// the result as a decimal string.
pub fn hash_for_device(address: &str, port: u16) -> String {
    let mut data = String::with_capacity(address.len() + 5);
    data.push_str(address);
    data.push_str(&port.to_string());
    jenkins_one_at_a_time(data.as_bytes()).to_string()
}

/// Hash an arbitrary string with the same algorithm, used to derive a
/// session's hash identity from its assigned name.
pub fn hash_string(s: &str) -> String {
    jenkins_one_at_a_time(s.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_for_same_address_and_port() {
        let a = hash_for_device("192.168.1.10", 44510);
        let b = hash_for_device("192.168.1.10", 44510);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_differs_for_different_ports() {
        let a = hash_for_device("192.168.1.10", 44510);
        let b = hash_for_device("192.168.1.10", 44511);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_differs_for_different_addresses() {
        let a = hash_for_device("192.168.1.10", 44510);
        let b = hash_for_device("192.168.1.11", 44510);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_a_plain_decimal_string() {
        let h = hash_for_device("10.0.0.1", 8080);
        assert!(h.chars().all(|c| c.is_ascii_digit()));
    }
}
