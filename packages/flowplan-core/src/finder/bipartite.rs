//! Edge-bundle compatibility
//!
//! A pattern bundle of k scope expressions is compatible with a bundle of k
//! parallel scopes iff the bipartite graph `expressions <-> scopes` induced
//! by the compatibility matrix has a perfect matching. Kuhn's augmenting
//! path algorithm, O(k^3); bundles are small so constants do not matter,
//! but the factorial permutation scan it replaces fell over around k = 6.
//! The permutation scan survives behind a config switch for regression
//! comparison only.

/// True iff `compat` (rows: expressions, columns: scopes) admits a perfect
/// matching. Expects a square matrix; a non-square input cannot be covered
/// and returns false.
pub fn has_perfect_matching(compat: &[Vec<bool>]) -> bool {
    let k = compat.len();

    if k == 0 {
        return true;
    }

    if compat.iter().any(|row| row.len() != k) {
        return false;
    }

    // matched_with[column] = row currently matched to that column
    let mut matched_with: Vec<Option<usize>> = vec![None; k];

    for row in 0..k {
        let mut visited = vec![false; k];
        if !augment(compat, row, &mut visited, &mut matched_with) {
            return false;
        }
    }

    true
}

fn augment(
    compat: &[Vec<bool>],
    row: usize,
    visited: &mut [bool],
    matched_with: &mut [Option<usize>],
) -> bool {
    for column in 0..compat.len() {
        if !compat[row][column] || visited[column] {
            continue;
        }

        visited[column] = true;

        let free = match matched_with[column] {
            None => true,
            Some(other) => augment(compat, other, visited, matched_with),
        };

        if free {
            matched_with[column] = Some(row);
            return true;
        }
    }

    false
}

/// Permutation scan: true iff some ordering of the rows puts `true` on the
/// whole diagonal. Semantically identical to [`has_perfect_matching`];
/// factorial in k.
pub fn permutation_has_true_diagonal(compat: &[Vec<bool>]) -> bool {
    let k = compat.len();

    if k == 0 {
        return true;
    }

    if compat.iter().any(|row| row.len() != k) {
        return false;
    }

    let mut rows: Vec<usize> = (0..k).collect();
    permute(&mut rows, 0, &mut |order| {
        order
            .iter()
            .enumerate()
            .all(|(column, &row)| compat[row][column])
    })
}

fn permute(rows: &mut [usize], depth: usize, accept: &mut impl FnMut(&[usize]) -> bool) -> bool {
    if depth == rows.len() {
        return accept(rows);
    }

    for i in depth..rows.len() {
        rows.swap(depth, i);
        if permute(rows, depth + 1, accept) {
            return true;
        }
        rows.swap(depth, i);
    }

    false
}
