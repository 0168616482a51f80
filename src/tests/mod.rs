pub(crate) mod test_support;
