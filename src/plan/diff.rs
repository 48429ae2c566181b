//! Line-based unified diff (Myers).

const CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// Render a unified diff of `old` against `new` for one file.
///
/// Returns an empty string when the texts are equal.
pub fn unified_diff(file_identity: &str, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }

    let a: Vec<&str> = old.split_inclusive('\n').collect();
    let b: Vec<&str> = new.split_inclusive('\n').collect();
    let ops = shortest_edit(&a, &b);

    let mut out = format!("--- a/{}\n+++ b/{}\n", file_identity, file_identity);
    for range in hunks(&ops) {
        write_hunk(&mut out, &ops[range], &a, &b);
    }
    out
}

/// Myers' O(ND) shortest edit script.
fn shortest_edit(a: &[&str], b: &[&str]) -> Vec<Op> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = (n + m) as usize;
    let offset = max as isize + 1;
    let mut v = vec![0isize; 2 * max + 3];
    let mut trace = Vec::new();

    'search: for d in 0..=max as isize {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    let mut ops = Vec::new();
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let idx = (k + offset) as usize;
        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            ops.push(Op::Equal(x as usize - 1, y as usize - 1));
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                ops.push(Op::Insert(y as usize - 1));
            } else {
                ops.push(Op::Delete(x as usize - 1));
            }
        }
        x = prev_x;
        y = prev_y;
    }

    ops.reverse();
    ops
}

/// Group changes with their surrounding context into hunk ranges.
fn hunks(ops: &[Op]) -> Vec<std::ops::Range<usize>> {
    let is_equal = |i: usize| matches!(ops[i], Op::Equal(..));
    let mut ranges = Vec::new();
    let mut i = 0;
    let mut prev_end = 0;

    while i < ops.len() {
        if is_equal(i) {
            i += 1;
            continue;
        }

        let start = i.saturating_sub(CONTEXT).max(prev_end);
        let mut j = i;
        let change_end = loop {
            while j < ops.len() && !is_equal(j) {
                j += 1;
            }
            let mut k = j;
            while k < ops.len() && is_equal(k) {
                k += 1;
            }
            if k < ops.len() && k - j <= 2 * CONTEXT {
                j = k;
            } else {
                break j;
            }
        };

        let end = (change_end + CONTEXT).min(ops.len());
        ranges.push(start..end);
        prev_end = end;
        i = end;
    }
    ranges
}

fn write_hunk(out: &mut String, ops: &[Op], a: &[&str], b: &[&str]) {
    let (old_start, new_start) = match ops.first() {
        Some(Op::Equal(x, y)) => (*x, *y),
        Some(Op::Delete(x)) => (*x, first_new(ops)),
        Some(Op::Insert(y)) => (first_old(ops), *y),
        None => return,
    };
    let old_count = ops.iter().filter(|op| !matches!(op, Op::Insert(_))).count();
    let new_count = ops.iter().filter(|op| !matches!(op, Op::Delete(_))).count();

    out.push_str(&format!(
        "@@ -{} +{} @@\n",
        hunk_range(old_start, old_count),
        hunk_range(new_start, new_count)
    ));

    for op in ops {
        let (marker, line) = match *op {
            Op::Equal(x, _) => (' ', a[x]),
            Op::Delete(x) => ('-', a[x]),
            Op::Insert(y) => ('+', b[y]),
        };
        out.push(marker);
        match line.strip_suffix('\n') {
            Some(content) => {
                out.push_str(content);
                out.push('\n');
            }
            None => {
                out.push_str(line);
                out.push_str("\n\\ No newline at end of file\n");
            }
        }
    }
}

/// Old-side position of a hunk that opens with insertions.
fn first_old(ops: &[Op]) -> usize {
    ops.iter()
        .find_map(|op| match op {
            Op::Equal(x, _) | Op::Delete(x) => Some(*x),
            Op::Insert(_) => None,
        })
        .unwrap_or(0)
}

/// New-side position of a hunk that opens with deletions.
fn first_new(ops: &[Op]) -> usize {
    ops.iter()
        .find_map(|op| match op {
            Op::Equal(_, y) | Op::Insert(y) => Some(*y),
            Op::Delete(_) => None,
        })
        .unwrap_or(0)
}

/// `start,count` in unified diff notation (1-indexed, `start` is the line
/// before an empty range).
fn hunk_range(start: usize, count: usize) -> String {
    match count {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, count),
    }
}
