/// Distance from the nearest integer below which a weight counts as integral.
pub const INTEGRALITY_TOLERANCE: f64 = 1e-4;
/// Residual capacity at or below this value marks a resource as saturated.
pub const SATURATION_TOLERANCE: f64 = 1e-6;

pub fn fractional_part(value: f64) -> f64 {
    value - value.floor()
}

pub fn distance_to_integer(value: f64) -> f64 {
    (value - value.round()).abs()
}

pub fn is_integral(value: f64, tolerance: f64) -> bool {
    distance_to_integer(value) <= tolerance
}

pub fn is_fractional(value: f64, tolerance: f64) -> bool {
    !is_integral(value, tolerance)
}

/// Room left before `value` reaches the next integer above it.
pub fn slack_up(value: f64) -> f64 {
    value.floor() + 1.0 - value
}

/// Room left before `value` reaches the integer below it.
pub fn slack_down(value: f64) -> f64 {
    fractional_part(value)
}

/// Rounds a settled weight: floor, unless the weight sits within `tolerance`
/// of the next integer.
pub fn settle(value: f64, tolerance: f64) -> u32 {
    let floor = value.floor();
    let settled = if value - floor > 1.0 - tolerance {
        floor + 1.0
    } else {
        floor
    };
    settled.max(0.0) as u32
}

/// Snaps `value` onto the nearest integer if it is within `tolerance` of it.
pub fn snap(value: f64, tolerance: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() <= tolerance {
        rounded
    } else {
        value
    }
}

/// Brings `rows` (each `cols` wide) to reduced row echelon form in place and
/// returns the pivot column of each leading row. Rows past the rank end up
/// zero.
pub fn row_reduce(rows: &mut [Vec<f64>], cols: usize, tolerance: f64) -> Vec<usize> {
    let mut pivots = Vec::new();
    for col in 0..cols {
        let rank = pivots.len();
        if rank == rows.len() {
            break;
        }
        let Some(best) = (rank..rows.len())
            .max_by(|&a, &b| rows[a][col].abs().total_cmp(&rows[b][col].abs()))
        else {
            break;
        };
        if rows[best][col].abs() <= tolerance {
            continue;
        }
        rows.swap(rank, best);
        let pivot = rows[rank][col];
        for value in rows[rank].iter_mut() {
            *value /= pivot;
        }
        let pivot_row = rows[rank].clone();
        for (idx, row) in rows.iter_mut().enumerate() {
            let factor = row[col];
            if idx == rank || factor == 0.0 {
                continue;
            }
            for (value, p) in row.iter_mut().zip(pivot_row.iter()) {
                *value -= factor * p;
            }
        }
        pivots.push(col);
    }
    pivots
}

/// Kernel vector of a system reduced by [`row_reduce`]: `free` set to one,
/// every other non-pivot column set to zero.
pub fn kernel_vector(
    reduced: &[Vec<f64>],
    pivots: &[usize],
    cols: usize,
    free: usize,
) -> Vec<f64> {
    let mut x = vec![0.0; cols];
    x[free] = 1.0;
    for (row, &col) in reduced.iter().zip(pivots.iter()) {
        x[col] = -row[free];
    }
    x
}
