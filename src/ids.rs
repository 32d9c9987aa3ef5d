use uuid::Uuid;

/// Length of a logframe item identifier.
pub const ID_LEN: usize = 8;

/// Produce a short opaque identifier for a new logframe item.
///
/// The id is the first eight characters of a random v4 UUID. No registry is
/// consulted; within one session a collision is treated as impossible.
pub fn generate_id() -> String {
    let mut id = Uuid::new_v4().to_string();
    id.truncate(ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_short_and_distinct() {
        let ids: HashSet<String> = (0..500).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.len() == ID_LEN));
        assert!(ids.iter().all(|id| id.chars().all(|c| c.is_ascii_hexdigit())));
    }
}
