use chrono::Utc;
use rand::Rng;

/// Every pass identifier is exactly this many characters before URL
/// encoding (and after, for the alphanumeric tokens produced here).
pub const PASS_ID_LEN: usize = 12;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Produces the opaque token printed on a ticket and scanned at entry:
/// base36 of the current millisecond timestamp plus six random base36
/// characters, truncated to [`PASS_ID_LEN`], uppercased, URL-encoded.
///
/// The token is time+randomness based and only best-effort unique;
/// `ticket_type_id` is accepted for interface stability but does not
/// influence the output, and `event_id`/`ticket_id` are only used as pad
/// material in the (practically unreachable) short case. True uniqueness
/// is enforced by the storage layer's unique index, with the orchestrator
/// regenerating on conflict.
pub fn generate_pass_id(event_id: i64, ticket_id: i64, _ticket_type_id: i64) -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    let mut raw = to_base36(millis);

    let mut rng = rand::thread_rng();
    for _ in 0..6 {
        raw.push(BASE36[rng.gen_range(0..36)] as char);
    }

    let mut token: String = raw.chars().take(PASS_ID_LEN).collect();
    token.make_ascii_uppercase();

    if token.len() < PASS_ID_LEN {
        let filler = format!("{}{}", event_id, ticket_id);
        let mut pad = filler.chars().cycle();
        while token.len() < PASS_ID_LEN {
            match pad.next() {
                Some(c) => token.push(c),
                None => token.push('0'),
            }
        }
    }

    urlencoding::encode(&token).into_owned()
}

/// Recovers the human-readable form of a stored pass id for display on
/// the PDF. Falls back to the input unchanged if it is not valid
/// percent-encoding.
pub fn decode_pass_id(encoded: &str) -> String {
    urlencoding::decode(encoded)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| encoded.to_string())
}
