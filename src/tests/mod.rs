mod test_read_levels;
