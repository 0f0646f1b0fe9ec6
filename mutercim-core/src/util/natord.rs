use std::cmp::Ordering;

/// Compare two filenames the way a human orders pages: embedded digit runs
/// are compared as numbers, everything else byte-wise and case-insensitively.
/// `page_2` sorts before `page_10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut xs = a.as_bytes().iter().peekable();
    let mut ys = b.as_bytes().iter().peekable();

    loop {
        match (xs.peek().copied(), ys.peek().copied()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&x), Some(&y)) => {
                if x.is_ascii_digit() && y.is_ascii_digit() {
                    let nx = take_number(&mut xs);
                    let ny = take_number(&mut ys);
                    match nx.cmp(&ny) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                } else {
                    match x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase()) {
                        Ordering::Equal => {
                            xs.next();
                            ys.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }

    // Equal natural keys ("A1" vs "a01"): fall back to byte order so the
    // result is a strict total order and sorting stays stable.
    a.cmp(b)
}

fn take_number<'a, I>(it: &mut std::iter::Peekable<I>) -> u128
where
    I: Iterator<Item = &'a u8>,
{
    let mut n: u128 = 0;
    while let Some(&&c) = it.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        n = n.saturating_mul(10).saturating_add((c - b'0') as u128);
        it.next();
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_runs_compare_numerically() {
        let mut names = vec!["page_2.png", "page_10.png", "page_1.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["page_1.png", "page_2.png", "page_10.png"]);
    }

    #[test]
    fn mixed_text_and_numbers() {
        let mut names = vec!["ch10/p1.jpg", "ch2/p3.jpg", "ch2/p10.jpg"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["ch2/p3.jpg", "ch2/p10.jpg", "ch10/p1.jpg"]);
    }

    #[test]
    fn case_insensitive_on_letters() {
        assert_eq!(natural_cmp("Page_3.jpg", "page_12.jpg"), Ordering::Less);
    }

    #[test]
    fn equal_keys_still_totally_ordered() {
        assert_ne!(natural_cmp("a01", "a1"), Ordering::Equal);
        assert_eq!(natural_cmp("a1", "a1"), Ordering::Equal);
    }

    #[test]
    fn long_digit_runs_do_not_overflow() {
        let big = "99999999999999999999999999999999999999990";
        let bigger = "99999999999999999999999999999999999999991";
        // Saturated comparisons still keep distinct strings distinct.
        assert_ne!(natural_cmp(big, bigger), Ordering::Equal);
    }
}
