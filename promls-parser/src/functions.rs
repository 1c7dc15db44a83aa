//! Built-in PromQL functions, aggregation operators and binary operators, with the
//! documentation shown in hovers and completion items.

use crate::ast::{AggregateOp, BinaryOp, ValueType};

/// A named, typed function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ValueType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Function {
    pub name: &'static str,
    pub params: &'static [Param],
    /// How many trailing parameters may be omitted.
    pub optional: usize,
    /// Whether the last parameter may be repeated.
    pub variadic: bool,
    pub returns: ValueType,
    pub doc: &'static str,
}

impl Function {
    /// Number of parameters that must be supplied. A variadic parameter may be repeated
    /// zero times.
    #[must_use]
    pub fn required(&self) -> usize {
        self.params
            .len()
            .saturating_sub(self.optional + usize::from(self.variadic))
    }

    /// `rate(v range-vector) instant vector` style signature.
    #[must_use]
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(Param::label)
            .collect::<Vec<_>>()
            .join(", ");
        let variadic = if self.variadic { ", ..." } else { "" };
        format!("{}({params}{variadic}) {}", self.name, self.returns)
    }
}

impl Param {
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.name, self.kind)
    }
}

const fn p(name: &'static str, kind: ValueType) -> Param {
    Param { name, kind }
}

const V: ValueType = ValueType::Vector;
const M: ValueType = ValueType::Matrix;
const S: ValueType = ValueType::Scalar;
const STR: ValueType = ValueType::String;

const fn f(
    name: &'static str,
    params: &'static [Param],
    returns: ValueType,
    doc: &'static str,
) -> Function {
    Function {
        name,
        params,
        optional: 0,
        variadic: false,
        returns,
        doc,
    }
}

const fn optional(mut function: Function, optional: usize) -> Function {
    function.optional = optional;
    function
}

const fn variadic(mut function: Function) -> Function {
    function.variadic = true;
    function
}

/// All built-in functions, sorted by name.
pub const FUNCTIONS: &[Function] = &[
    f("abs", &[p("v", V)], V, "Returns the input vector with all sample values converted to their absolute value."),
    f("absent", &[p("v", V)], V, "Returns an empty vector if the vector passed to it has any elements and a 1-element vector with the value 1 if the vector passed to it has no elements."),
    f("absent_over_time", &[p("v", M)], V, "Returns an empty vector if the range vector passed to it has any elements and a 1-element vector with the value 1 if the range vector passed to it has no elements."),
    f("avg_over_time", &[p("v", M)], V, "The average value of all points in the specified interval."),
    f("ceil", &[p("v", V)], V, "Rounds the sample values of all elements in `v` up to the nearest integer."),
    f("changes", &[p("v", M)], V, "Returns the number of times the value of each time series has changed within the provided time range."),
    f("clamp_max", &[p("v", V), p("max", S)], V, "Clamps the sample values of all elements in `v` to have an upper limit of `max`."),
    f("clamp_min", &[p("v", V), p("min", S)], V, "Clamps the sample values of all elements in `v` to have a lower limit of `min`."),
    f("count_over_time", &[p("v", M)], V, "The count of all values in the specified interval."),
    optional(f("day_of_month", &[p("v", V)], V, "Returns the day of the month for each of the given times in UTC. Returned values are from 1 to 31."), 1),
    optional(f("day_of_week", &[p("v", V)], V, "Returns the day of the week for each of the given times in UTC. Returned values are from 0 to 6, where 0 means Sunday."), 1),
    optional(f("days_in_month", &[p("v", V)], V, "Returns number of days in the month for each of the given times in UTC. Returned values are from 28 to 31."), 1),
    f("delta", &[p("v", M)], V, "Calculates the difference between the first and last value of each time series element in a range vector."),
    f("deriv", &[p("v", M)], V, "Calculates the per-second derivative of the time series in a range vector using simple linear regression."),
    f("exp", &[p("v", V)], V, "Calculates the exponential function for all elements in `v`."),
    f("floor", &[p("v", V)], V, "Rounds the sample values of all elements in `v` down to the nearest integer."),
    f("histogram_quantile", &[p("φ", S), p("b", V)], V, "Calculates the φ-quantile (0 ≤ φ ≤ 1) from the buckets `b` of a histogram."),
    f("holt_winters", &[p("v", M), p("sf", S), p("tf", S)], V, "Produces a smoothed value for time series based on the range in `v`."),
    optional(f("hour", &[p("v", V)], V, "Returns the hour of the day for each of the given times in UTC. Returned values are from 0 to 23."), 1),
    f("idelta", &[p("v", M)], V, "Calculates the difference between the last two samples in the range vector `v`."),
    f("increase", &[p("v", M)], V, "Calculates the increase in the time series in the range vector."),
    f("irate", &[p("v", M)], V, "Calculates the per-second instant rate of increase of the time series in the range vector, based on the last two data points."),
    variadic(f("label_join", &[p("v", V), p("dst_label", STR), p("separator", STR), p("src_label", STR)], V, "Joins all the values of all the `src_labels` using `separator` and returns the time series with the label `dst_label` containing the joined value.")),
    f("label_replace", &[p("v", V), p("dst_label", STR), p("replacement", STR), p("src_label", STR), p("regex", STR)], V, "Matches the regular expression `regex` against the label `src_label`. If it matches, returns the time series with the label `dst_label` replaced by the expansion of `replacement`."),
    f("ln", &[p("v", V)], V, "Calculates the natural logarithm for all elements in `v`."),
    f("log10", &[p("v", V)], V, "Calculates the decimal logarithm for all elements in `v`."),
    f("log2", &[p("v", V)], V, "Calculates the binary logarithm for all elements in `v`."),
    f("max_over_time", &[p("v", M)], V, "The maximum value of all points in the specified interval."),
    f("min_over_time", &[p("v", M)], V, "The minimum value of all points in the specified interval."),
    optional(f("minute", &[p("v", V)], V, "Returns the minute of the hour for each of the given times in UTC. Returned values are from 0 to 59."), 1),
    optional(f("month", &[p("v", V)], V, "Returns the month of the year for each of the given times in UTC. Returned values are from 1 to 12."), 1),
    f("predict_linear", &[p("v", M), p("t", S)], V, "Predicts the value of time series `t` seconds from now, based on the range vector `v`, using simple linear regression."),
    f("quantile_over_time", &[p("φ", S), p("v", M)], V, "The φ-quantile (0 ≤ φ ≤ 1) of the values in the specified interval."),
    f("rate", &[p("v", M)], V, "Calculates the per-second average rate of increase of the time series in the range vector."),
    f("resets", &[p("v", M)], V, "Returns the number of counter resets within the provided time range as an instant vector."),
    optional(f("round", &[p("v", V), p("to_nearest", S)], V, "Rounds the sample values of all elements in `v` to the nearest integer, or to the nearest multiple of `to_nearest`."), 1),
    f("scalar", &[p("v", V)], S, "Given a single-element input vector, returns the sample value of that single element as a scalar."),
    f("sort", &[p("v", V)], V, "Returns vector elements sorted by their sample values, in ascending order."),
    f("sort_desc", &[p("v", V)], V, "Same as `sort`, but sorts in descending order."),
    f("sqrt", &[p("v", V)], V, "Calculates the square root of all elements in `v`."),
    f("stddev_over_time", &[p("v", M)], V, "The population standard deviation of the values in the specified interval."),
    f("stdvar_over_time", &[p("v", M)], V, "The population standard variance of the values in the specified interval."),
    f("sum_over_time", &[p("v", M)], V, "The sum of all values in the specified interval."),
    f("time", &[], S, "Returns the number of seconds since January 1, 1970 UTC."),
    f("timestamp", &[p("v", V)], V, "Returns the timestamp of each of the samples of the given vector as the number of seconds since January 1, 1970 UTC."),
    f("vector", &[p("s", S)], V, "Returns the scalar `s` as a vector with no labels."),
    optional(f("year", &[p("v", V)], V, "Returns the year for each of the given times in UTC."), 1),
];

/// Look up a built-in function by name.
#[must_use]
pub fn function(name: &str) -> Option<&'static Function> {
    FUNCTIONS
        .binary_search_by(|func| func.name.cmp(name))
        .ok()
        .and_then(|idx| FUNCTIONS.get(idx))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregation {
    pub op: AggregateOp,
    pub doc: &'static str,
}

impl Aggregation {
    #[must_use]
    pub fn signature(&self) -> String {
        match self.op.param_type() {
            Some(kind) => format!(
                "{}({} {kind}, v instant vector) instant vector",
                self.op,
                param_name(self.op)
            ),
            None => format!("{}(v instant vector) instant vector", self.op),
        }
    }

    /// Parameters in call order, the operator parameter first when there is one.
    #[must_use]
    pub fn params(&self) -> Vec<Param> {
        self.op
            .param_type()
            .map(|kind| p(param_name(self.op), kind))
            .into_iter()
            .chain(std::iter::once(p("v", V)))
            .collect()
    }
}

fn param_name(op: AggregateOp) -> &'static str {
    match op {
        AggregateOp::Topk | AggregateOp::Bottomk => "k",
        AggregateOp::Quantile => "φ",
        AggregateOp::CountValues => "label",
        AggregateOp::Avg
        | AggregateOp::Count
        | AggregateOp::Group
        | AggregateOp::Max
        | AggregateOp::Min
        | AggregateOp::Stddev
        | AggregateOp::Stdvar
        | AggregateOp::Sum => "param",
    }
}

/// All aggregation operators, sorted by name.
pub const AGGREGATIONS: &[Aggregation] = &[
    Aggregation { op: AggregateOp::Avg, doc: "Calculate the average over dimensions." },
    Aggregation { op: AggregateOp::Bottomk, doc: "Smallest k elements by sample value." },
    Aggregation { op: AggregateOp::Count, doc: "Count number of elements in the vector." },
    Aggregation { op: AggregateOp::CountValues, doc: "Count number of elements with the same value." },
    Aggregation { op: AggregateOp::Group, doc: "All values in the resulting vector are 1." },
    Aggregation { op: AggregateOp::Max, doc: "Select maximum over dimensions." },
    Aggregation { op: AggregateOp::Min, doc: "Select minimum over dimensions." },
    Aggregation { op: AggregateOp::Quantile, doc: "Calculate φ-quantile (0 ≤ φ ≤ 1) over dimensions." },
    Aggregation { op: AggregateOp::Stddev, doc: "Calculate population standard deviation over dimensions." },
    Aggregation { op: AggregateOp::Stdvar, doc: "Calculate population standard variance over dimensions." },
    Aggregation { op: AggregateOp::Sum, doc: "Calculate sum over dimensions." },
    Aggregation { op: AggregateOp::Topk, doc: "Largest k elements by sample value." },
];

#[must_use]
pub fn aggregation(op: AggregateOp) -> Option<&'static Aggregation> {
    AGGREGATIONS.iter().find(|agg| agg.op == op)
}

/// Documentation for a binary operator.
#[must_use]
pub fn operator_doc(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "Addition. Applied between scalars, a vector and a scalar, or two vectors.",
        BinaryOp::Sub => "Subtraction. Applied between scalars, a vector and a scalar, or two vectors.",
        BinaryOp::Mul => "Multiplication. Applied between scalars, a vector and a scalar, or two vectors.",
        BinaryOp::Div => "Division. Applied between scalars, a vector and a scalar, or two vectors.",
        BinaryOp::Mod => "Modulo. Applied between scalars, a vector and a scalar, or two vectors.",
        BinaryOp::Pow => "Power/exponentiation. Right associative.",
        BinaryOp::Atan2 => "Arc tangent of the left hand side divided by the right hand side, in radians.",
        BinaryOp::Eql => "Equal. Filters series unless the `bool` modifier is given, which returns 0 or 1 instead.",
        BinaryOp::Neq => "Not equal. Filters series unless the `bool` modifier is given, which returns 0 or 1 instead.",
        BinaryOp::Gtr => "Greater than. Filters series unless the `bool` modifier is given, which returns 0 or 1 instead.",
        BinaryOp::Lss => "Less than. Filters series unless the `bool` modifier is given, which returns 0 or 1 instead.",
        BinaryOp::Gte => "Greater or equal. Filters series unless the `bool` modifier is given, which returns 0 or 1 instead.",
        BinaryOp::Lte => "Less or equal. Filters series unless the `bool` modifier is given, which returns 0 or 1 instead.",
        BinaryOp::And => "Intersection. Elements of the left hand side with an exactly matching label set on the right hand side.",
        BinaryOp::Or => "Union. All elements of the left hand side plus the elements of the right hand side without a matching label set on the left.",
        BinaryOp::Unless => "Complement. Elements of the left hand side without an exactly matching label set on the right hand side.",
    }
}
