//! GraphQL scalar definitions.

use std::{fmt, marker::PhantomData, str::FromStr};

use juniper::{
    GraphQLType, InputValue, ParseScalarResult, ParseScalarValue, ScalarToken,
    ScalarValue, Value,
};

/// Adapter for `#[graphql(with = ..)]` attribute, exposing a domain type as
/// a string GraphQL scalar.
///
/// Output is the [`Display`] of the wrapped `As` value, and input is parsed
/// with its [`FromStr`], so the domain validation applies to every argument
/// of the scalar.
///
/// [`Display`]: fmt::Display
#[derive(Debug)]
pub struct Via<As>(PhantomData<As>);

impl<As> Via<As> {
    /// Renders the wrapped `As` value as a string scalar [`Value`].
    pub fn to_output<T, S>(value: &T) -> Value<S>
    where
        As: fmt::Display,
        T: AsRef<As>,
        S: ScalarValue,
    {
        Value::from(value.as_ref().to_string())
    }

    /// Parses the target type out of a string scalar [`InputValue`].
    ///
    /// # Errors
    ///
    /// If the [`InputValue`] is not a string, or it's rejected by the
    /// [`FromStr`] impl of `As` type.
    #[expect(clippy::missing_panics_doc, reason = "infallible")]
    pub fn from_input<T, S>(input: &InputValue<S>) -> Result<T, String>
    where
        As: FromStr,
        As::Err: fmt::Display,
        T: TryFrom<As> + GraphQLType<S, TypeInfo = ()>,
        T::Error: fmt::Display,
        S: ScalarValue,
    {
        let name = T::name(&()).expect("named scalar");
        let s = input.as_string_value().ok_or_else(|| {
            format!("`{name}` must be a string, found: {input}")
        })?;
        s.parse::<As>()
            .map_err(|e| format!("`{name}` cannot be \"{s}\": {e}"))?
            .try_into()
            .map_err(|e| format!("`{name}` cannot be \"{s}\": {e}"))
    }

    /// Parses the provided [`ScalarToken`] as a [`String`].
    ///
    /// # Errors
    ///
    /// If the [`ScalarToken`] is not a string.
    pub fn parse_token<S: ScalarValue>(
        value: ScalarToken<'_>,
    ) -> ParseScalarResult<S> {
        <String as ParseScalarValue<S>>::from_str(value)
    }
}

#[cfg(test)]
mod spec {
    use juniper::{DefaultScalarValue, InputValue, Value};
    use service::domain;

    use crate::api::payment::Phone;

    use super::Via;

    type PhoneVia = Via<domain::payment::Phone>;

    #[test]
    fn normalizes_phone_input() {
        let phone = PhoneVia::from_input::<Phone, DefaultScalarValue>(
            &InputValue::scalar("0712 345-678"),
        )
        .unwrap();

        assert_eq!(
            PhoneVia::to_output::<_, DefaultScalarValue>(&phone),
            Value::scalar("254712345678"),
        );
    }

    #[test]
    fn rejects_malformed_input() {
        let err = PhoneVia::from_input::<Phone, DefaultScalarValue>(
            &InputValue::scalar("12345"),
        )
        .unwrap_err();
        assert!(err.starts_with("`Phone` cannot be"), "{err}");

        let err = PhoneVia::from_input::<Phone, DefaultScalarValue>(
            &InputValue::scalar(712_345_678),
        )
        .unwrap_err();
        assert!(err.starts_with("`Phone` must be a string"), "{err}");
    }
}
