use crate::matcher::AbstractMatcher;
use crate::subst::Subst;
use pyz_abstract::{testing, Ctx, TableHost, ValueId, View};
use pyz_common::NameInterner;

pub(crate) static HOST: TableHost = TableHost;

pub(crate) fn new_ctx(names: &NameInterner) -> Ctx<'_> {
    Ctx::new(names, &HOST)
}

/// Match a single value against a formal type with a fresh substitution.
pub(crate) fn match_value(
    matcher: &mut AbstractMatcher,
    ctx: &Ctx,
    value: ValueId,
    formal: ValueId,
) -> Option<Subst> {
    let var = testing::var_of(ctx, value);
    matcher.match_var_against_type(var, formal, &Subst::new(), &View::new())
}
