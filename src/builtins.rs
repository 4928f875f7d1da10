use serde::{Deserialize, Serialize};

use crate::runtime::{RuntimeFault, RuntimeResult, Value};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleMode {
    #[default]
    Radians,
    Degrees,
}

/// Accepted argument shape for one builtin parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// int or float
    Number,
    Int,
    /// array of numbers
    NumericArray,
    /// array of anything
    AnyArray,
    Matrix,
}

impl ParamKind {
    pub fn accepts(self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Unknown) => true,
            (ParamKind::Number, ty) => ty.is_numeric(),
            (ParamKind::Int, Type::Int) => true,
            (ParamKind::NumericArray, Type::Array(element)) => {
                element.is_numeric() || element.is_unknown()
            }
            (ParamKind::AnyArray, Type::Array(_)) => true,
            (ParamKind::Matrix, Type::Matrix(_)) => true,
            _ => false,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ParamKind::Number => "number",
            ParamKind::Int => "int",
            ParamKind::NumericArray => "numeric array",
            ParamKind::AnyArray => "array",
            ParamKind::Matrix => "matrix",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    /// Base-10 logarithm under its short name.
    Lg,
    /// `log(x)` is base 10, `log(x, base)` takes an explicit base.
    Log,
    Log10,
    Log2,
    Sqrt,
    Cbrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Factorial,
    Gcd,
    Lcm,
    Pi,
    E,
    Degrees,
    Radians,
    Len,
    Sum,
    Max,
    Min,
    Mean,
    Median,
    Stdev,
    Variance,
    Det,
    Trace,
    Inverse,
    Transpose,
}

impl BuiltinFunction {
    pub const ALL: [BuiltinFunction; 40] = [
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Asin,
        Self::Acos,
        Self::Atan,
        Self::Sinh,
        Self::Cosh,
        Self::Tanh,
        Self::Exp,
        Self::Ln,
        Self::Lg,
        Self::Log,
        Self::Log10,
        Self::Log2,
        Self::Sqrt,
        Self::Cbrt,
        Self::Abs,
        Self::Floor,
        Self::Ceil,
        Self::Round,
        Self::Factorial,
        Self::Gcd,
        Self::Lcm,
        Self::Pi,
        Self::E,
        Self::Degrees,
        Self::Radians,
        Self::Len,
        Self::Sum,
        Self::Max,
        Self::Min,
        Self::Mean,
        Self::Median,
        Self::Stdev,
        Self::Variance,
        Self::Det,
        Self::Trace,
        Self::Inverse,
        Self::Transpose,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Lg => "lg",
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Log2 => "log2",
            Self::Sqrt => "sqrt",
            Self::Cbrt => "cbrt",
            Self::Abs => "abs",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Factorial => "factorial",
            Self::Gcd => "gcd",
            Self::Lcm => "lcm",
            Self::Pi => "pi",
            Self::E => "e",
            Self::Degrees => "degrees",
            Self::Radians => "radians",
            Self::Len => "len",
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Stdev => "stdev",
            Self::Variance => "variance",
            Self::Det => "det",
            Self::Trace => "trace",
            Self::Inverse => "inverse",
            Self::Transpose => "transpose",
        }
    }

    pub fn params(self) -> &'static [ParamKind] {
        use ParamKind::*;

        match self {
            Self::Pi | Self::E | Self::Degrees | Self::Radians => &[],
            Self::Factorial => &[Int],
            Self::Gcd | Self::Lcm => &[Int, Int],
            Self::Len => &[AnyArray],
            Self::Log => &[Number, Number],
            Self::Sum
            | Self::Max
            | Self::Min
            | Self::Mean
            | Self::Median
            | Self::Stdev
            | Self::Variance => &[NumericArray],
            Self::Det | Self::Trace | Self::Inverse | Self::Transpose => &[Matrix],
            _ => &[Number],
        }
    }

    /// Leading parameters that must be supplied; the rest are optional.
    pub fn required_params(self) -> usize {
        match self {
            Self::Log => 1,
            _ => self.params().len(),
        }
    }

    pub fn accepts_arity(self, count: usize) -> bool {
        (self.required_params()..=self.params().len()).contains(&count)
    }

    pub fn return_type(self) -> Type {
        match self {
            Self::Floor | Self::Ceil | Self::Round | Self::Factorial | Self::Gcd | Self::Lcm => {
                Type::Int
            }
            Self::Len => Type::Int,
            Self::Degrees | Self::Radians => Type::Void,
            Self::Inverse | Self::Transpose => Type::Matrix(None),
            _ => Type::Float,
        }
    }

    /// Evaluates the builtin on already type-checked arguments.
    pub fn call(self, args: &[Value], angle_mode: &mut AngleMode) -> RuntimeResult<Value> {
        if !self.accepts_arity(args.len()) {
            return Err(RuntimeFault::ArityMismatch {
                name: self.name().to_string(),
                expected: self.params().len(),
                found: args.len(),
            });
        }
        let to_radians = |x: f64| match angle_mode {
            AngleMode::Radians => x,
            AngleMode::Degrees => x.to_radians(),
        };
        let from_radians = |x: f64| match angle_mode {
            AngleMode::Radians => x,
            AngleMode::Degrees => x.to_degrees(),
        };

        let value = match self {
            Self::Sin => Value::Float(to_radians(args[0].as_float()?).sin()),
            Self::Cos => Value::Float(to_radians(args[0].as_float()?).cos()),
            Self::Tan => Value::Float(to_radians(args[0].as_float()?).tan()),
            Self::Asin | Self::Acos => {
                let x = args[0].as_float()?;
                if !(-1.0..=1.0).contains(&x) {
                    return Err(self.domain_error(x));
                }
                let result = if self == Self::Asin { x.asin() } else { x.acos() };
                Value::Float(from_radians(result))
            }
            Self::Atan => Value::Float(from_radians(args[0].as_float()?.atan())),
            Self::Sinh => Value::Float(args[0].as_float()?.sinh()),
            Self::Cosh => Value::Float(args[0].as_float()?.cosh()),
            Self::Tanh => Value::Float(args[0].as_float()?.tanh()),
            Self::Exp => Value::Float(args[0].as_float()?.exp()),
            Self::Ln | Self::Lg | Self::Log | Self::Log10 | Self::Log2 => {
                let x = args[0].as_float()?;
                if x <= 0.0 {
                    return Err(self.domain_error(x));
                }
                Value::Float(match (self, args.get(1)) {
                    (Self::Log, Some(base)) => {
                        let base = base.as_float()?;
                        if base <= 0.0 || base == 1.0 {
                            return Err(self.domain_error(base));
                        }
                        x.ln() / base.ln()
                    }
                    (Self::Ln, _) => x.ln(),
                    (Self::Log2, _) => x.log2(),
                    _ => x.log10(),
                })
            }
            Self::Sqrt => {
                let x = args[0].as_float()?;
                if x < 0.0 {
                    return Err(self.domain_error(x));
                }
                Value::Float(x.sqrt())
            }
            Self::Cbrt => Value::Float(args[0].as_float()?.cbrt()),
            Self::Abs => Value::Float(args[0].as_float()?.abs()),
            Self::Floor => Value::Int(args[0].as_float()?.floor() as i64),
            Self::Ceil => Value::Int(args[0].as_float()?.ceil() as i64),
            Self::Round => Value::Int(args[0].as_float()?.round() as i64),
            Self::Factorial => {
                let n = args[0].as_int()?;
                if !(0..=20).contains(&n) {
                    return Err(self.domain_error(n as f64));
                }
                Value::Int((1..=n).product())
            }
            Self::Gcd => Value::Int(gcd(args[0].as_int()?, args[1].as_int()?)),
            Self::Lcm => {
                let (a, b) = (args[0].as_int()?, args[1].as_int()?);
                let divisor = gcd(a, b);
                if divisor == 0 {
                    Value::Int(0)
                } else {
                    Value::Int((a / divisor).wrapping_mul(b).wrapping_abs())
                }
            }
            Self::Pi => Value::Float(std::f64::consts::PI),
            Self::E => Value::Float(std::f64::consts::E),
            Self::Degrees => {
                *angle_mode = AngleMode::Degrees;
                Value::Void
            }
            Self::Radians => {
                *angle_mode = AngleMode::Radians;
                Value::Void
            }
            Self::Len => Value::Int(args[0].as_array()?.len() as i64),
            Self::Sum => Value::Float(numbers(&args[0])?.iter().sum()),
            Self::Max | Self::Min | Self::Mean => {
                let values = numbers(&args[0])?;
                if values.is_empty() {
                    return Err(RuntimeFault::EmptyArray {
                        function: self.name(),
                    });
                }
                let result = match self {
                    Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                    _ => values.iter().sum::<f64>() / values.len() as f64,
                };
                Value::Float(result)
            }
            Self::Median => {
                let mut values = numbers(&args[0])?;
                if values.is_empty() {
                    return Err(RuntimeFault::EmptyArray {
                        function: self.name(),
                    });
                }
                values.sort_by(f64::total_cmp);
                let middle = values.len() / 2;
                let median = if values.len() % 2 == 0 {
                    (values[middle - 1] + values[middle]) / 2.0
                } else {
                    values[middle]
                };
                Value::Float(median)
            }
            Self::Stdev | Self::Variance => {
                let values = numbers(&args[0])?;
                let variance = self.population_variance(&values)?;
                Value::Float(if self == Self::Stdev {
                    variance.sqrt()
                } else {
                    variance
                })
            }
            Self::Det => Value::Float(args[0].as_matrix()?.determinant()?),
            Self::Trace => Value::Float(args[0].as_matrix()?.trace()?),
            Self::Inverse => Value::Matrix(args[0].as_matrix()?.inverse()?),
            Self::Transpose => Value::Matrix(args[0].as_matrix()?.transpose()),
        };
        Ok(value)
    }

    fn population_variance(self, values: &[f64]) -> RuntimeResult<f64> {
        match values.len() {
            0 => Err(RuntimeFault::EmptyArray {
                function: self.name(),
            }),
            1 => Err(RuntimeFault::TooFewValues {
                function: self.name(),
                needed: 2,
                found: 1,
            }),
            count => {
                let count = count as f64;
                let mean = values.iter().sum::<f64>() / count;
                Ok(values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count)
            }
        }
    }

    fn domain_error(self, value: f64) -> RuntimeFault {
        RuntimeFault::DomainError {
            function: self.name(),
            value,
        }
    }
}

fn numbers(value: &Value) -> RuntimeResult<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_float).collect()
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.wrapping_abs(), b.wrapping_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(builtin: BuiltinFunction, args: &[Value]) -> RuntimeResult<Value> {
        builtin.call(args, &mut AngleMode::Radians)
    }

    #[test]
    fn resolves_names() {
        assert_eq!(BuiltinFunction::from_name("sqrt"), Some(BuiltinFunction::Sqrt));
        assert_eq!(BuiltinFunction::from_name("print"), None);
        for builtin in BuiltinFunction::ALL {
            assert_eq!(BuiltinFunction::from_name(builtin.name()), Some(builtin));
        }
    }

    #[test]
    fn reports_domain_errors() {
        assert!(matches!(
            call(BuiltinFunction::Sqrt, &[Value::Int(-4)]),
            Err(RuntimeFault::DomainError { function: "sqrt", .. })
        ));
        assert!(matches!(
            call(BuiltinFunction::Ln, &[Value::Float(0.0)]),
            Err(RuntimeFault::DomainError { .. })
        ));
        assert!(matches!(
            call(BuiltinFunction::Max, &[Value::Array(Vec::new())]),
            Err(RuntimeFault::EmptyArray { function: "max" })
        ));
    }

    #[test]
    fn integer_helpers() {
        assert_eq!(call(BuiltinFunction::Factorial, &[Value::Int(5)]), Ok(Value::Int(120)));
        assert_eq!(
            call(BuiltinFunction::Gcd, &[Value::Int(12), Value::Int(18)]),
            Ok(Value::Int(6))
        );
        assert_eq!(
            call(BuiltinFunction::Lcm, &[Value::Int(4), Value::Int(6)]),
            Ok(Value::Int(12))
        );
        assert_eq!(call(BuiltinFunction::Round, &[Value::Float(2.5)]), Ok(Value::Int(3)));
    }

    #[test]
    fn angle_mode_switches_trigonometry() {
        let mut mode = AngleMode::Radians;
        BuiltinFunction::Degrees
            .call(&[], &mut mode)
            .expect("mode switch");
        assert_eq!(mode, AngleMode::Degrees);
        let Ok(Value::Float(sine)) = BuiltinFunction::Sin.call(&[Value::Int(90)], &mut mode) else {
            panic!("expected float");
        };
        assert!((sine - 1.0).abs() < 1e-12);
    }

    #[test]
    fn logarithms_with_and_without_base() {
        fn float(builtin: BuiltinFunction, args: &[Value]) -> f64 {
            match call(builtin, args) {
                Ok(Value::Float(value)) => value,
                other => panic!("expected float, got {other:?}"),
            }
        }
        assert!((float(BuiltinFunction::Lg, &[Value::Int(1000)]) - 3.0).abs() < 1e-12);
        assert!((float(BuiltinFunction::Log, &[Value::Int(100)]) - 2.0).abs() < 1e-12);
        let eight = float(BuiltinFunction::Log, &[Value::Int(256), Value::Int(2)]);
        assert!((eight - 8.0).abs() < 1e-12);
        for base in [0.0, -2.0, 1.0] {
            assert!(matches!(
                call(BuiltinFunction::Log, &[Value::Int(8), Value::Float(base)]),
                Err(RuntimeFault::DomainError { function: "log", value }) if value == base
            ));
        }
        assert!(matches!(
            call(BuiltinFunction::Log, &[Value::Int(-1), Value::Int(2)]),
            Err(RuntimeFault::DomainError { .. })
        ));
        assert!(BuiltinFunction::Log.accepts_arity(1));
        assert!(BuiltinFunction::Log.accepts_arity(2));
        assert!(!BuiltinFunction::Log.accepts_arity(3));
        assert!(matches!(
            call(BuiltinFunction::Lg, &[Value::Int(1), Value::Int(2)]),
            Err(RuntimeFault::ArityMismatch { .. })
        ));
    }

    #[test]
    fn statistics_over_arrays() {
        fn values(items: &[i64]) -> Value {
            Value::Array(items.iter().copied().map(Value::Int).collect())
        }
        assert_eq!(
            call(BuiltinFunction::Median, &[values(&[5, 1, 3])]),
            Ok(Value::Float(3.0))
        );
        assert_eq!(
            call(BuiltinFunction::Median, &[values(&[4, 1, 3, 2])]),
            Ok(Value::Float(2.5))
        );
        assert_eq!(
            call(BuiltinFunction::Variance, &[values(&[2, 4, 4, 4, 5, 5, 7, 9])]),
            Ok(Value::Float(4.0))
        );
        assert_eq!(
            call(BuiltinFunction::Stdev, &[values(&[2, 4, 4, 4, 5, 5, 7, 9])]),
            Ok(Value::Float(2.0))
        );
        assert_eq!(
            call(BuiltinFunction::Median, &[values(&[])]),
            Err(RuntimeFault::EmptyArray { function: "median" })
        );
        assert_eq!(
            call(BuiltinFunction::Stdev, &[values(&[])]),
            Err(RuntimeFault::EmptyArray { function: "stdev" })
        );
        assert_eq!(
            call(BuiltinFunction::Variance, &[values(&[7])]),
            Err(RuntimeFault::TooFewValues {
                function: "variance",
                needed: 2,
                found: 1,
            })
        );
    }
}
