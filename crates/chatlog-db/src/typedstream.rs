//! Plain-text recovery from serialized attributed-string blobs.
//!
//! The blob is a "typed stream": class names, attribute runs and the message
//! string are all embedded as byte runs. Only enough of the layout is read to
//! find string runs; the rest is ignored.
//!
//! A run starts after `0x01 0x2B`. It is either length prefixed (one byte, or
//! `0x81` followed by a little-endian `u16`) and followed by the `0x86 0x84`
//! terminator, or bounded only by that terminator. A marker with neither is
//! not a run. The longest run wins.

const START_MARKER: [u8; 2] = [0x01, 0x2B];
const END_MARKER: [u8; 2] = [0x86, 0x84];
const WIDE_LENGTH_TAG: u8 = 0x81;

/// Best-effort text extraction. Never fails: anything unrecoverable yields
/// an empty string.
pub fn decode_attributed_body(blob: &[u8]) -> String {
    if blob.is_empty() {
        return String::new();
    }

    let mut best: Option<&[u8]> = None;
    for run in text_runs(blob) {
        // Strictly longer so the first-seen run wins ties.
        if best.is_none_or(|current| run.len() > current.len()) {
            best = Some(run);
        }
    }

    let run = match best {
        Some(run) => run,
        // Without any marker the whole blob is the only candidate.
        None if find(blob, &START_MARKER).is_none() => blob,
        None => return String::new(),
    };
    std::str::from_utf8(strip_leading_controls(run))
        .map(str::to_owned)
        .unwrap_or_default()
}

fn text_runs(blob: &[u8]) -> Vec<&[u8]> {
    let mut runs = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = find(&blob[cursor..], &START_MARKER) {
        let start = cursor + offset + START_MARKER.len();
        match read_run(blob, start) {
            Some((run, next)) => {
                runs.push(run);
                cursor = next;
            }
            // Unterminated: skip the marker and keep scanning.
            None => cursor = start,
        }
    }

    runs
}

/// Reads one run beginning at `start`. Returns the run and the offset to
/// resume scanning from, or `None` when no terminator closes it.
fn read_run(blob: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = &blob[start..];

    if let Some((run, consumed)) = length_prefixed(rest) {
        return Some((run, start + consumed));
    }

    // Runs longer than a length prefix can describe are bounded by the
    // terminator alone, however long they are.
    let end = find(rest, &END_MARKER)?;
    Some((&rest[..end], start + end + END_MARKER.len()))
}

/// Accepts a length prefix only when it lands exactly on a terminator.
fn length_prefixed(rest: &[u8]) -> Option<(&[u8], usize)> {
    let (&tag, tail) = rest.split_first()?;

    let mut headers = Vec::with_capacity(2);
    if tag == WIDE_LENGTH_TAG && tail.len() >= 2 {
        headers.push((3, usize::from(u16::from_le_bytes([tail[0], tail[1]]))));
    }
    headers.push((1, usize::from(tag)));

    for (header, len) in headers {
        let end = header + len;
        if end > rest.len() {
            continue;
        }
        if rest[end..].starts_with(&END_MARKER) {
            return Some((&rest[header..end], end + END_MARKER.len()));
        }
    }

    None
}

fn strip_leading_controls(run: &[u8]) -> &[u8] {
    let skip = run.iter().take_while(|&&b| b < 0x20).count();
    &run[skip..]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
