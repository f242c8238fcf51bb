pub mod sql_query;
