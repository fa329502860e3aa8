/// Build an [`Entry`](crate::entry::Entry) from a dn and attribute value pairs. Intended
/// for tests and seed data, so an invalid dn panics.
///
/// ```ignore
/// let e = entry_init!(
///     "cn=alice,ou=users,dc=example",
///     (ATTR_OBJECTCLASS, CLASS_PERSON),
///     (ATTR_CN, "alice")
/// );
/// ```
#[macro_export]
macro_rules! entry_init {
    ($dn:expr $(, ($attr:expr, $value:expr))* $(,)?) => {{
        #[allow(clippy::expect_used)]
        let dn = $crate::dn::Dn::parse($dn).expect("invalid dn");
        #[allow(unused_mut)]
        let mut e = $crate::entry::Entry::new(dn);
        $(
            e.add_ava($attr, $value);
        )*
        e
    }};
}

/// Build a [`ModifyList`](crate::modify::ModifyList) from modifications.
#[macro_export]
macro_rules! modlist {
    ($($m:expr),* $(,)?) => {
        $crate::modify::ModifyList::new_list(vec![$($m),*])
    };
}
