//! Messages and client of the `mediax.store` protocol, generated from
//! `proto/store.proto` by the build script.

tonic::include_proto!("mediax.store");

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_query_request_wire_tags() {
        let request = QueryRequest {
            limit: 7,
            count: true,
            ..Default::default()
        };
        // limit is field 6, count is field 7, both varints
        assert_eq!(request.encode_to_vec(), vec![0x30, 7, 0x38, 1]);
    }

    #[test]
    fn test_literal_oneof_round_trip() {
        let literal = Literal {
            data: Some(literal::Data::FloatVectorData(FloatVector { vector: vec![1.0, 0.0] })),
        };
        let decoded = Literal::decode(literal.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, literal);
        assert_eq!(ColumnType::FloatVector as i32, 14);
        assert_eq!(CompareOperator::Like as i32, 6);
    }
}
