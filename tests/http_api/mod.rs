mod read_json_test;
