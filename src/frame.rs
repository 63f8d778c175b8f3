//! DataFrame plumbing shared by the transformer and the analyses:
//! column presence checks, typed column extraction and pandas-style
//! left merges with suffix disambiguation.

use std::collections::{BTreeMap, HashSet};

use polars::prelude::*;

use crate::error::{Result, TrialError};
use crate::metrics::parse_decimal;

const ROW_ORDER: &str = "__row_order";

// ── Column presence ─────────────────────────────────────────────────────────

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

pub fn missing_columns<S: AsRef<str>>(df: &DataFrame, required: &[S]) -> Vec<String> {
    required
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| !has_column(df, c))
        .map(|c| c.to_string())
        .collect()
}

pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    for &col_name in required {
        if !has_column(df, col_name) {
            return Err(TrialError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names_str()
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// ── Reshaping ───────────────────────────────────────────────────────────────

/// Drop the listed columns that exist; absent names are ignored.
pub fn drop_existing(df: DataFrame, drop: &[&str]) -> Result<DataFrame> {
    let keep: Vec<String> = column_names(&df)
        .into_iter()
        .filter(|c| !drop.contains(&c.as_str()))
        .collect();
    if keep.len() == df.width() {
        return Ok(df);
    }
    Ok(df.select(keep)?)
}

/// Keep only the listed columns that exist, in the given order.
pub fn select_existing(df: &DataFrame, wanted: &[&str]) -> Result<DataFrame> {
    let keep: Vec<&str> = wanted.iter().copied().filter(|c| has_column(df, c)).collect();
    Ok(df.select(keep)?)
}

/// Rename `(old, new)` pairs whose source column exists.
pub fn rename_existing(df: DataFrame, pairs: &[(&str, &str)]) -> Result<DataFrame> {
    let (old, new): (Vec<&str>, Vec<&str>) = pairs
        .iter()
        .copied()
        .filter(|(old, _)| has_column(&df, old))
        .unzip();
    if old.is_empty() {
        return Ok(df);
    }
    Ok(df.lazy().rename(old, new, true).collect()?)
}

/// Left join on a single key, pandas style: the key is compared as a string
/// on both sides, overlapping non-key columns get `suffixes.0` on the left
/// and `suffixes.1` on the right (an empty suffix leaves the name as is),
/// and the left row order is preserved.
pub fn left_merge(
    left: DataFrame,
    right: DataFrame,
    on: &str,
    suffixes: (&str, &str),
) -> Result<DataFrame> {
    let left_names: HashSet<String> = column_names(&left).into_iter().collect();
    let overlap: Vec<String> = column_names(&right)
        .into_iter()
        .filter(|c| c != on && left_names.contains(c))
        .collect();

    let (left_suffix, right_suffix) = suffixes;
    let mut left = text_key(left, on)?.lazy().with_row_index(ROW_ORDER, None);
    let mut right = text_key(right, on)?.lazy();

    if !overlap.is_empty() {
        if !left_suffix.is_empty() {
            let renamed: Vec<String> = overlap.iter().map(|c| format!("{c}{left_suffix}")).collect();
            left = left.rename(&overlap, &renamed, true);
        }
        if !right_suffix.is_empty() {
            let renamed: Vec<String> = overlap.iter().map(|c| format!("{c}{right_suffix}")).collect();
            right = right.rename(&overlap, &renamed, true);
        }
    }

    let joined = left
        .join(right, [col(on)], [col(on)], JoinArgs::new(JoinType::Left))
        .sort(
            [ROW_ORDER],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;

    Ok(joined.drop(ROW_ORDER)?)
}

/// Replace `on` with its text rendering so both sides of a join agree.
fn text_key(mut df: DataFrame, on: &str) -> Result<DataFrame> {
    require_columns(&df, &[on])?;
    let values = text_values(&df, on)?;
    put_text(&mut df, on, &values)?;
    Ok(df)
}

/// Non-null values of `name` that occur on more than one row, sorted.
pub fn duplicate_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in text_values(df, name)?.into_iter().flatten() {
        *counts.entry(value).or_default() += 1;
    }
    Ok(counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(value, _)| value)
        .collect())
}

/// Keep the first row for each value of `name`. Rows where it is null are kept.
pub fn first_per_value(df: &DataFrame, name: &str) -> Result<DataFrame> {
    let mut seen = HashSet::new();
    let mask: Vec<bool> = text_values(df, name)?
        .into_iter()
        .map(|v| v.map_or(true, |v| seen.insert(v)))
        .collect();
    Ok(df.filter(&BooleanChunked::from_slice(name.into(), &mask))?)
}

// ── Typed extraction ────────────────────────────────────────────────────────

/// Column values as floats. String columns are parsed (decimal comma
/// accepted); unparseable values, NaN and infinities become `None`.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?;
    if column.dtype() == &DataType::String {
        return Ok(column
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_decimal))
            .collect());
    }
    let cast = column.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Column values rendered as text. Integral floats print without a
/// fractional part so that `101.0` and `101` build the same key.
pub fn text_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?;
    match column.dtype() {
        DataType::String => Ok(column
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()),
        DataType::Float32 | DataType::Float64 => {
            let cast = column.cast(&DataType::Float64)?;
            Ok(cast
                .f64()?
                .into_iter()
                .map(|v| {
                    v.filter(|x| x.is_finite()).map(|x| {
                        if x.fract() == 0.0 {
                            format!("{}", x as i64)
                        } else {
                            x.to_string()
                        }
                    })
                })
                .collect())
        }
        _ => {
            let cast = column.cast(&DataType::String)?;
            Ok(cast
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect())
        }
    }
}

/// `a + sep + b + ...` per row; `None` when any part is missing.
pub fn concat_text(df: &DataFrame, parts: &[&str], sep: &str) -> Result<Vec<Option<String>>> {
    let columns = parts
        .iter()
        .map(|p| text_values(df, p))
        .collect::<Result<Vec<_>>>()?;
    Ok((0..df.height())
        .map(|i| {
            columns
                .iter()
                .map(|c| c[i].as_deref())
                .collect::<Option<Vec<&str>>>()
                .map(|v| v.join(sep))
        })
        .collect())
}

/// Replace each listed column that exists with its parsed Float64 values.
pub fn cast_f64(df: &mut DataFrame, names: &[&str]) -> Result<()> {
    for &name in names {
        if has_column(df, name) {
            let values = f64_values(df, name)?;
            put_f64(df, name, &values)?;
        }
    }
    Ok(())
}

/// Numeric columns by dtype, excluding the given names.
pub fn numeric_columns(df: &DataFrame, exclude: &[&str]) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| is_numeric(c.dtype()))
        .map(|c| c.name().to_string())
        .filter(|n| !exclude.contains(&n.as_str()))
        .collect()
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

// ── Writing ─────────────────────────────────────────────────────────────────

pub fn put_f64(df: &mut DataFrame, name: &str, values: &[Option<f64>]) -> Result<()> {
    df.with_column(Column::new(name.into(), values))?;
    Ok(())
}

pub fn put_i64(df: &mut DataFrame, name: &str, values: &[Option<i64>]) -> Result<()> {
    df.with_column(Column::new(name.into(), values))?;
    Ok(())
}

pub fn put_text(df: &mut DataFrame, name: &str, values: &[Option<String>]) -> Result<()> {
    df.with_column(Column::new(name.into(), values))?;
    Ok(())
}
